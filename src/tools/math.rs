//! Arithmetic helper tools: `sum` and `isPrime`

use crate::error::{AgentLoopError, Result};
use crate::tools::{
    parse_args, ParamType, ParameterSchema, ToolDeclaration, ToolExecutor, ToolKind, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Largest magnitude `isPrime` accepts: 2^53, up to which every integer is an exact `f64`
pub const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Deserialize)]
struct SumParams {
    num1: f64,
    num2: f64,
}

#[derive(Debug, Deserialize)]
struct IsPrimeParams {
    num: f64,
}

/// Adds two numbers
#[derive(Debug, Default)]
pub struct SumTool;

impl SumTool {
    fn run(&self, args: Value) -> Result<String> {
        let params: SumParams = parse_args(ToolKind::Sum, args)?;
        Ok((params.num1 + params.num2).to_string())
    }
}

#[async_trait]
impl ToolExecutor for SumTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Sum
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::Sum,
            "Get the sum of 2 numbers",
            ParameterSchema::new()
                .required("num1", ParamType::Number, "First number for addition")
                .required("num2", ParamType::Number, "Second number for addition"),
        )
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::from_outcome(self.run(args))
    }
}

/// Tests whether a whole number is prime
#[derive(Debug, Default)]
pub struct IsPrimeTool;

impl IsPrimeTool {
    fn candidate(&self, args: Value) -> Result<Option<u64>> {
        let params: IsPrimeParams = parse_args(ToolKind::IsPrime, args)?;
        let num = params.num;

        if !num.is_finite() || num.fract() != 0.0 {
            return Err(invalid_num(format!("num must be a whole number, got {}", num)));
        }
        if num.abs() > MAX_EXACT_INTEGER {
            return Err(invalid_num(format!(
                "num must be at most {} in magnitude, got {}",
                MAX_EXACT_INTEGER, num
            )));
        }

        Ok((num >= 2.0).then_some(num as u64))
    }

    async fn run(&self, args: Value) -> Result<String> {
        let n = match self.candidate(args)? {
            Some(n) => n,
            None => return Ok(false.to_string()),
        };

        // Trial division on large inputs must not stall the async workers.
        let prime = tokio::task::spawn_blocking(move || is_prime(n))
            .await
            .map_err(|e| AgentLoopError::Tool(format!("Primality check failed: {}", e)))?;
        Ok(prime.to_string())
    }
}

fn invalid_num(message: String) -> anyhow::Error {
    AgentLoopError::InvalidArguments {
        tool: ToolKind::IsPrime.name().to_string(),
        message,
    }
    .into()
}

/// Trial division by 2, 3 and then `6k ± 1` up to the square root
///
/// # Examples
///
/// ```
/// use agentloop::tools::math::is_prime;
///
/// assert!(is_prime(13));
/// assert!(!is_prime(1));
/// ```
pub fn is_prime(n: u64) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

#[async_trait]
impl ToolExecutor for IsPrimeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::IsPrime
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::IsPrime,
            "Check whether a whole number is prime",
            ParameterSchema::new().required("num", ParamType::Number, "Number to test"),
        )
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::from_outcome(self.run(args).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_sum() {
        let result = SumTool.execute(json!({"num1": 2, "num2": 3})).await;
        assert!(result.is_success());
        assert_eq!(result.payload, "5");

        let result = SumTool.execute(json!({"num1": 1.5, "num2": 0.25})).await;
        assert_eq!(result.payload, "1.75");
    }

    #[tokio::test]
    async fn test_sum_rejects_strings() {
        let result = SumTool.execute(json!({"num1": "2", "num2": 3})).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.payload.contains("'sum'"));
    }

    #[tokio::test]
    async fn test_is_prime() {
        assert_eq!(IsPrimeTool.execute(json!({"num": 7})).await.payload, "true");
        assert_eq!(IsPrimeTool.execute(json!({"num": 9})).await.payload, "false");
        assert_eq!(IsPrimeTool.execute(json!({"num": 1})).await.payload, "false");
        assert_eq!(IsPrimeTool.execute(json!({"num": -7})).await.payload, "false");
        assert_eq!(IsPrimeTool.execute(json!({"num": 7.0})).await.payload, "true");
    }

    #[tokio::test]
    async fn test_is_prime_rejects_fraction() {
        let result = IsPrimeTool.execute(json!({"num": 7.5})).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.payload.contains("whole number"));
    }

    #[tokio::test]
    async fn test_is_prime_rejects_values_beyond_exact_range() {
        for num in [1e19, -1e300, 18_446_744_073_709_551_557.0] {
            let result = IsPrimeTool.execute(json!({ "num": num })).await;
            assert_eq!(result.status, ToolStatus::Error);
            assert!(result.payload.contains("at most"), "payload: {}", result.payload);
        }
    }

    #[tokio::test]
    async fn test_is_prime_large_input_leaves_runtime_responsive() {
        // 2^53 - 111 is prime, so every trial divisor up to its square root runs.
        let check = tokio::spawn(async move {
            let tool = IsPrimeTool;
            tool.execute(json!({"num": 9_007_199_254_740_881u64})).await
        });
        let ticker = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            tokio::time::sleep(std::time::Duration::from_millis(10)),
        )
        .await;
        assert!(ticker.is_ok());

        let result = check.await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload, "true");
    }

    #[test]
    fn test_is_prime_fn() {
        let primes: Vec<u64> = (0..30).filter(|n| is_prime(*n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(is_prime(7919));
        assert!(!is_prime(25));
        assert!(!is_prime(49));
        assert!(!is_prime(7919 * 7927));
    }
}
