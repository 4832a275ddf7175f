//! System instruction for the agent loop
//!
//! The instruction tells the model how to work through a task one tool call at
//! a time, how to write multi-line files on the operator's OS, and that its
//! final answer must be plain text.

use crate::tools::ToolDeclaration;

const WORKFLOW: &str = r#"
## Workflow: PLAN -> EXECUTE -> VALIDATE -> REPEAT

Follow this loop for every task:
1. **PLAN**: Decide on the single next logical step.
2. **EXECUTE**: Call exactly one tool for that step.
3. **VALIDATE**: Examine the tool result. Every result carries a status of
   `success` or `error`.
   - On `success`, check the output confirms the step did what you expected.
     After creating a file, list the directory. After writing a file, read it back.
   - On `error`, read the diagnostic and choose a corrected step. Do not give up
     on the first error.
4. **REPEAT**: Continue until the request is fully completed.
"#;

const UNIX_FILE_RULES: &str = r#"
## Writing Multi-line Files (Linux / macOS)

- Use `cat` with a here-document to write multi-line content.
- Quote the delimiter (`'EOF'`) so the shell does not expand `$` and backticks.
- Example:
  cat << 'EOF' > my-project/index.html
  <!DOCTYPE html>
  <html>
    <body><h1>Hello World</h1></body>
  </html>
  EOF
"#;

const WINDOWS_FILE_RULES: &str = r#"
## Writing Multi-line Files (Windows)

- Use a PowerShell here-string piped to `Set-Content`.
- Syntax: @' ... content ... '@ | Set-Content -Path "path\to\file"
- Special characters such as `<`, `>` and `&` need no escaping inside the here-string.
- Use backslashes in paths.
- Example:
  @'
  const greeting = 'hello';
  console.log(greeting);
  '@ | Set-Content -Path "my-app\script.js"
"#;

const SINGLE_LINE_RULE: &str =
    "Never write a complex file with a single `echo \"...\" > file` command.";

const FINAL_ANSWER: &str = r#"
## Final Answer

When the task is complete, reply with a plain text message summarizing what you
did and where any created files are. Do not call any more tools at that point.
"#;

const DIRECT_ANSWER: &str = r#"
No tools are available in this session. Answer the user's request directly in
plain text.
"#;

/// Returns the operating system identifier the instruction is built for
///
/// # Examples
///
/// ```
/// use agentloop::prompts::current_os;
///
/// assert_eq!(current_os(), std::env::consts::OS);
/// ```
pub fn current_os() -> &'static str {
    std::env::consts::OS
}

fn is_windows(os: &str) -> bool {
    matches!(os.to_ascii_lowercase().as_str(), "windows" | "win32")
}

/// Builds the system instruction for a session
///
/// With an empty tool list the instruction asks for a direct answer instead of
/// describing the tool workflow.
///
/// # Arguments
///
/// * `os` - Operating system identifier (`linux`, `macos`, `windows`, ...)
/// * `tools` - Declarations the model will be offered
///
/// # Examples
///
/// ```
/// use agentloop::prompts::build_system_instruction;
///
/// let instruction = build_system_instruction("linux", &[]);
/// assert!(instruction.contains("linux"));
/// assert!(instruction.contains("directly"));
/// ```
pub fn build_system_instruction(os: &str, tools: &[ToolDeclaration]) -> String {
    let mut instruction = format!(
        "You are an expert command-line assistant. You complete the user's request \
by calling tools one at a time and checking each result.\n\n\
The user's operating system is: {}\n",
        os
    );

    if tools.is_empty() {
        instruction.push_str(DIRECT_ANSWER);
        return instruction;
    }

    instruction.push_str("\n## Available Tools\n\n");
    for tool in tools {
        instruction.push_str(&format!("- `{}`: {}\n", tool.name, tool.description));
    }

    instruction.push_str(WORKFLOW);

    if tools.iter().any(|t| t.name == "executeCommand") {
        instruction.push_str(if is_windows(os) {
            WINDOWS_FILE_RULES
        } else {
            UNIX_FILE_RULES
        });
        instruction.push('\n');
        instruction.push_str(SINGLE_LINE_RULE);
        instruction.push('\n');
    }

    instruction.push_str(FINAL_ANSWER);
    instruction
}
