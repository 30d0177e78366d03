use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolError, parse_args};
use crate::sandbox::{SandboxExecutor, SandboxRequest};

/// Executes Python code, typically to render charts into the working directory.
pub struct PythonRepl {
    executor: Arc<dyn SandboxExecutor>,
    timeout: Duration,
}

impl PythonRepl {
    pub fn new(executor: Arc<dyn SandboxExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }
}

#[derive(Deserialize)]
struct ReplArgs {
    code: String,
}

#[async_trait]
impl Tool for PythonRepl {
    fn name(&self) -> &str {
        "python_repl"
    }

    fn description(&self) -> &str {
        "Use this to execute python code. If you want to see the output of a value, you should \
         print it out with `print(...)`. This is visible to the user."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "The python code to execute to generate your chart."}
            },
            "required": ["code"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: ReplArgs = parse_args(arguments)?;
        let request = SandboxRequest::new(args.code.clone()).with_timeout(self.timeout);
        let result = self
            .executor
            .execute(request)
            .await
            .map_err(|err| ToolError::Sandbox(format!("{err:#}")))?;

        if result.timed_out {
            return Ok(format!(
                "Failed to execute. Error: timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if !result.success() {
            return Ok(format!("Failed to execute. Error: {}", result.stderr.trim_end()));
        }
        Ok(format!(
            "Successfully executed:\n```python\n{}\n```\nStdout: {}",
            args.code, result.stdout
        ))
    }
}
