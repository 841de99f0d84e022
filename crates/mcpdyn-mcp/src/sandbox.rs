//! Code sandbox - run generated programs against MCP servers
//!
//! A program is a small declarative document (JSON or YAML) that imports
//! servers through their virtual module specifiers and chains tool calls:
//!
//! ```yaml
//! imports:
//!   gh: mcp/github
//! steps:
//!   - name: issues
//!     call: gh.list_issues
//!     args: { repo: "$input.repo" }
//!   - call: gh.get_issue
//!     when: "$issues.0"
//!     args: { number: "$issues.0.number" }
//! return: "$prev"
//! ```
//!
//! References: `$input`, `$prev` and `$<step>` followed by an optional
//! dotted path (object keys or array indices). `$$` escapes a literal `$`.

use crate::config::MCPRegistry;
use crate::error::{MCPError, Result};
use crate::policy::{module_specifier, ExecutionPolicy};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default cap on program length
pub const DEFAULT_MAX_STEPS: usize = 64;
/// Default deadline for a whole program
pub const DEFAULT_SANDBOX_TIMEOUT: Duration = Duration::from_secs(60);

const RESERVED_NAMES: [&str; 2] = ["input", "prev"];

/// Something that can run a tool on behalf of a program
pub trait ToolInvoker: Send + Sync {
    /// Call `tool` on `server` with already-resolved arguments
    fn invoke<'a>(
        &'a self,
        server: &'a str,
        tool: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value>>;
}

/// Resource limits for one program run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Maximum number of steps a program may declare
    pub max_steps: usize,
    /// Deadline for the whole run
    pub timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            timeout: DEFAULT_SANDBOX_TIMEOUT,
        }
    }
}

/// Virtual modules (`mcp/<id>`) available to programs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleMap {
    modules: BTreeMap<String, String>,
}

impl ModuleMap {
    /// Expose every enabled server whose policy allows code access
    #[must_use]
    pub fn from_registry(registry: &MCPRegistry) -> Self {
        let mut map = Self::default();
        for (id, entry) in registry.enabled() {
            if ExecutionPolicy::derive(entry, &registry.defaults).code_access {
                map.insert(id);
            }
        }
        map
    }

    /// Expose one server
    pub fn insert(&mut self, server: &str) {
        self.modules
            .insert(module_specifier(server), server.to_string());
    }

    /// Server id behind a specifier
    ///
    /// # Errors
    /// `ModuleNotFound` listing the available specifiers
    pub fn resolve(&self, specifier: &str) -> Result<&str> {
        self.modules
            .get(specifier)
            .map(String::as_str)
            .ok_or_else(|| MCPError::ModuleNotFound {
                module: specifier.to_string(),
                available: self.specifiers(),
            })
    }

    /// All specifiers, sorted
    #[must_use]
    pub fn specifiers(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

/// What to do when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Stop the program and report failure
    #[default]
    Abort,
    /// Record the error and keep going
    Continue,
}

/// One tool call in a program
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Name later steps use to reference this output
    #[serde(default)]
    pub name: Option<String>,
    /// `alias.tool`
    pub call: String,
    /// Arguments, may contain references
    #[serde(default)]
    pub args: Value,
    /// Run the step only when this condition holds
    #[serde(default)]
    pub when: Option<String>,
    /// Failure handling
    #[serde(default)]
    pub on_error: OnError,
}

/// A parsed program
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    /// Alias to module specifier
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Result template; defaults to the last step output
    #[serde(default, rename = "return")]
    pub returns: Option<Value>,
}

impl Program {
    /// Parse JSON or YAML source
    ///
    /// # Errors
    /// `Program` when the source is empty, malformed or names steps badly
    pub fn parse(code: &str) -> Result<Self> {
        if code.trim().is_empty() {
            return Err(MCPError::Program("program is empty".into()));
        }
        // YAML is a superset of JSON, one parser covers both
        let program: Program = serde_yaml::from_str(code)
            .map_err(|e| MCPError::Program(format!("invalid program: {e}")))?;
        program.validate()?;
        Ok(program)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let Some(name) = &step.name else { continue };
            if name.is_empty() || name.contains('.') || name.starts_with('$') {
                return Err(MCPError::Program(format!(
                    "step {index} has an invalid name '{name}'"
                )));
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(MCPError::Program(format!(
                    "step {index} uses reserved name '{name}'"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(MCPError::Program(format!("duplicate step name '{name}'")));
            }
        }
        Ok(())
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Position in the program, from 0
    pub index: usize,
    /// Step name, when the program gave one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Call target as written (`alias.tool`)
    pub tool: String,
    /// The `when` condition was false
    pub skipped: bool,
    /// The call returned a value
    pub success: bool,
    /// Tool output, `null` when skipped or failed
    pub output: Value,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent on the step
    pub duration_ms: u64,
}

/// Outcome of a program run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Random v4 uuid identifying the run
    pub execution_id: String,
    /// No step aborted the program
    pub success: bool,
    /// The `return` reference, or the last step output
    pub result: Value,
    /// Error of the step that aborted the program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// One entry per step that ran or was skipped
    pub steps: Vec<StepResult>,
    /// Wall time for the whole program
    pub duration_ms: u64,
}

/// Runs programs with a fixed module map and limits
#[derive(Debug, Clone)]
pub struct Sandbox {
    modules: ModuleMap,
    limits: SandboxLimits,
}

struct Target<'p> {
    server: String,
    tool: &'p str,
}

impl Sandbox {
    /// Create a sandbox
    #[must_use]
    pub fn new(modules: ModuleMap, limits: SandboxLimits) -> Self {
        Self { modules, limits }
    }

    /// Modules programs may import
    #[must_use]
    pub fn modules(&self) -> &ModuleMap {
        &self.modules
    }

    /// Parse, link and run a program
    ///
    /// Step failures do not produce `Err`; they are reported in the
    /// [`ExecutionReport`].
    ///
    /// # Errors
    /// `Program` or `ModuleNotFound` before any step runs, `SandboxTimeout`
    /// when the deadline passes
    pub async fn execute(
        &self,
        invoker: &dyn ToolInvoker,
        code: &str,
        input: Value,
    ) -> Result<ExecutionReport> {
        let program = Program::parse(code)?;
        if program.steps.len() > self.limits.max_steps {
            return Err(MCPError::Program(format!(
                "program has {} steps, limit is {}",
                program.steps.len(),
                self.limits.max_steps
            )));
        }
        let targets = self.link(&program)?;

        let execution_id = uuid::Uuid::new_v4().to_string();
        info!(
            execution_id = %execution_id,
            steps = program.steps.len(),
            "Executing program"
        );

        let started = Instant::now();
        let mut report = tokio::time::timeout(
            self.limits.timeout,
            run(invoker, &program, &targets, input),
        )
        .await
        .map_err(|_| {
            warn!(execution_id = %execution_id, "Program exceeded its deadline");
            MCPError::SandboxTimeout(self.limits.timeout)
        })?;

        report.execution_id = execution_id;
        report.duration_ms = millis(started);
        info!(
            execution_id = %report.execution_id,
            success = report.success,
            duration_ms = report.duration_ms,
            "Program finished"
        );
        Ok(report)
    }

    fn link<'p>(&self, program: &'p Program) -> Result<Vec<Target<'p>>> {
        let mut aliases = HashMap::new();
        for (alias, specifier) in &program.imports {
            aliases.insert(alias.as_str(), self.modules.resolve(specifier)?.to_string());
        }

        program
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let (alias, tool) = step.call.split_once('.').ok_or_else(|| {
                    MCPError::Program(format!(
                        "step {index}: call '{}' must look like alias.tool",
                        step.call
                    ))
                })?;
                let server = aliases.get(alias).ok_or_else(|| {
                    MCPError::Program(format!(
                        "step {index}: '{alias}' is not imported"
                    ))
                })?;
                Ok(Target {
                    server: server.clone(),
                    tool,
                })
            })
            .collect()
    }
}

async fn run(
    invoker: &dyn ToolInvoker,
    program: &Program,
    targets: &[Target<'_>],
    input: Value,
) -> ExecutionReport {
    let mut scope = Scope::new(input);
    let mut steps = Vec::with_capacity(program.steps.len());

    for (index, (step, target)) in program.steps.iter().zip(targets).enumerate() {
        let started = Instant::now();
        let mut result = StepResult {
            index,
            name: step.name.clone(),
            tool: step.call.clone(),
            skipped: false,
            success: true,
            output: Value::Null,
            error: None,
            duration_ms: 0,
        };

        if let Some(condition) = &step.when {
            if !evaluate_condition(condition, &scope) {
                debug!("Step {} skipped, condition '{}' is false", index, condition);
                result.skipped = true;
                steps.push(result);
                continue;
            }
        }

        let outcome = match resolve_value(&step.args, &scope) {
            Ok(args) => invoker.invoke(&target.server, target.tool, args).await,
            Err(e) => Err(e),
        };
        result.duration_ms = millis(started);

        match outcome {
            Ok(output) => {
                debug!("Step {} ({}) succeeded", index, step.call);
                scope.record(step.name.as_deref(), output.clone());
                result.output = output;
                steps.push(result);
            }
            Err(e) => {
                warn!("Step {} ({}) failed: {}", index, step.call, e);
                result.success = false;
                result.error = Some(e.to_string());
                steps.push(result);
                if step.on_error == OnError::Abort {
                    return failed(steps, format!("step {index} ({}) failed: {e}", step.call));
                }
                scope.record_failure(step.name.as_deref());
            }
        }
    }

    let result = match &program.returns {
        Some(template) => match resolve_value(template, &scope) {
            Ok(value) => value,
            Err(e) => return failed(steps, format!("return: {e}")),
        },
        None => scope.prev.clone().unwrap_or(Value::Null),
    };

    ExecutionReport {
        execution_id: String::new(),
        success: true,
        result,
        error: None,
        steps,
        duration_ms: 0,
    }
}

fn failed(steps: Vec<StepResult>, error: String) -> ExecutionReport {
    ExecutionReport {
        execution_id: String::new(),
        success: false,
        result: Value::Null,
        error: Some(error),
        steps,
        duration_ms: 0,
    }
}

fn millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Values visible to references
struct Scope {
    input: Value,
    outputs: HashMap<String, Value>,
    prev: Option<Value>,
}

impl Scope {
    fn new(input: Value) -> Self {
        Self {
            input,
            outputs: HashMap::new(),
            prev: None,
        }
    }

    fn record(&mut self, name: Option<&str>, output: Value) {
        if let Some(name) = name {
            self.outputs.insert(name.to_string(), output.clone());
        }
        self.prev = Some(output);
    }

    /// `$prev` keeps pointing at the last successful output
    fn record_failure(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            self.outputs.insert(name.to_string(), Value::Null);
        }
    }

    fn lookup(&self, reference: &str) -> Result<Value> {
        let mut parts = reference.split('.');
        let source = parts.next().unwrap_or_default();
        let mut current = match source {
            "input" => &self.input,
            "prev" => self
                .prev
                .as_ref()
                .ok_or_else(|| MCPError::Program("'$prev' used before any step ran".into()))?,
            step => self.outputs.get(step).ok_or_else(|| {
                MCPError::Program(format!("step '{step}' not found or not yet executed"))
            })?,
        };

        for part in parts {
            let next = match current {
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                other => other.get(part),
            };
            current = next.ok_or_else(|| {
                MCPError::Program(format!("'${reference}': field '{part}' not found"))
            })?;
        }
        Ok(current.clone())
    }
}

/// Replace references inside a JSON template
fn resolve_value(template: &Value, scope: &Scope) -> Result<Value> {
    match template {
        Value::String(s) => {
            if let Some(escaped) = s.strip_prefix("$$") {
                Ok(Value::String(format!("${escaped}")))
            } else if let Some(reference) = s.strip_prefix('$') {
                scope.lookup(reference)
            } else {
                Ok(template.clone())
            }
        }
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, scope)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// `a == b`, `a != b` or a bare truthiness check
///
/// References that do not resolve count as `null`.
fn evaluate_condition(condition: &str, scope: &Scope) -> bool {
    let condition = condition.trim();
    if let Some((left, right)) = condition.split_once("==") {
        return condition_operand(left, scope) == condition_operand(right, scope);
    }
    if let Some((left, right)) = condition.split_once("!=") {
        return condition_operand(left, scope) != condition_operand(right, scope);
    }
    truthy(&condition_operand(condition, scope))
}

fn condition_operand(raw: &str, scope: &Scope) -> Value {
    let raw = raw.trim();
    if let Some(reference) = raw.strip_prefix('$') {
        return scope.lookup(reference).unwrap_or(Value::Null);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::from(n)
            } else if let Ok(n) = raw.parse::<f64>() {
                Value::from(n)
            } else {
                Value::String(raw.trim_matches('"').trim_matches('\'').to_string())
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// `list` returns two issues, `empty` an empty list, `fail` errors,
    /// `sleep` outlives any test deadline, anything else echoes
    #[derive(Default)]
    struct FakeInvoker {
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeInvoker {
        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolInvoker for FakeInvoker {
        fn invoke<'a>(
            &'a self,
            server: &'a str,
            tool: &'a str,
            args: Value,
        ) -> BoxFuture<'a, Result<Value>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((server.to_string(), tool.to_string(), args.clone()));
                match tool {
                    "list" => Ok(json!([{"number": 7}, {"number": 9}])),
                    "empty" => Ok(json!([])),
                    "fail" => Err(MCPError::ToolExecution {
                        server: server.into(),
                        tool: tool.into(),
                        reason: "boom".into(),
                    }),
                    "sleep" => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(Value::Null)
                    }
                    _ => Ok(json!({ "tool": tool, "args": args })),
                }
            })
        }
    }

    fn sandbox() -> Sandbox {
        let mut modules = ModuleMap::default();
        modules.insert("github");
        modules.insert("fs");
        Sandbox::new(modules, SandboxLimits::default())
    }

    #[tokio::test]
    async fn test_chained_references() {
        let invoker = FakeInvoker::default();
        let code = r#"
imports:
  gh: mcp/github
steps:
  - name: issues
    call: gh.list
    args: { repo: "$input.repo" }
  - name: first
    call: gh.get_issue
    when: "$issues.0"
    args: { number: "$issues.1.number", literal: "$$input" }
return: { issue: "$first.args.number", from: "$prev.tool" }
"#;
        let report = sandbox()
            .execute(&invoker, code, json!({"repo": "rust-lang/rust"}))
            .await
            .unwrap();

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.result, json!({"issue": 9, "from": "get_issue"}));
        assert_eq!(report.steps.len(), 2);
        assert!(!report.execution_id.is_empty());

        let calls = invoker.calls();
        assert_eq!(calls[0], ("github".into(), "list".into(), json!({"repo": "rust-lang/rust"})));
        assert_eq!(calls[1].2, json!({"number": 9, "literal": "$input"}));
    }

    #[tokio::test]
    async fn test_json_program_defaults_to_last_output() {
        let invoker = FakeInvoker::default();
        let code = r#"{"imports": {"f": "mcp/fs"}, "steps": [{"call": "f.read", "args": {"p": 1}}]}"#;
        let report = sandbox().execute(&invoker, code, Value::Null).await.unwrap();
        assert_eq!(report.result, json!({"tool": "read", "args": {"p": 1}}));
    }

    #[tokio::test]
    async fn test_false_condition_skips_step() {
        let invoker = FakeInvoker::default();
        let code = r#"
imports: { gh: mcp/github }
steps:
  - name: issues
    call: gh.empty
  - call: gh.get_issue
    when: "$issues.0"
    args: { number: "$issues.0.number" }
"#;
        let report = sandbox().execute(&invoker, code, Value::Null).await.unwrap();
        assert!(report.success);
        assert!(report.steps[1].skipped);
        assert_eq!(invoker.calls().len(), 1);
        assert_eq!(report.result, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_module_lists_available() {
        let err = sandbox()
            .execute(
                &FakeInvoker::default(),
                "imports: { db: mcp/postgres }\nsteps: []",
                Value::Null,
            )
            .await
            .unwrap_err();
        match err {
            MCPError::ModuleNotFound { module, available } => {
                assert_eq!(module, "mcp/postgres");
                assert_eq!(available, vec!["mcp/fs", "mcp/github"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unimported_alias_is_program_error() {
        let invoker = FakeInvoker::default();
        let err = sandbox()
            .execute(&invoker, "steps:\n  - call: gh.list", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::Program(_)));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_abort_stops_program() {
        let invoker = FakeInvoker::default();
        let code = r"
imports: { gh: mcp/github }
steps:
  - call: gh.fail
  - call: gh.list
";
        let report = sandbox().execute(&invoker, code, Value::Null).await.unwrap();
        assert!(!report.success);
        assert!(report.error.unwrap().contains("boom"));
        assert_eq!(report.steps.len(), 1);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_records_error() {
        let invoker = FakeInvoker::default();
        let code = r#"
imports: { gh: mcp/github }
steps:
  - name: broken
    call: gh.fail
    on_error: continue
  - call: gh.echo
    args: { was: "$broken" }
"#;
        let report = sandbox().execute(&invoker, code, Value::Null).await.unwrap();
        assert!(report.success);
        assert!(!report.steps[0].success);
        assert_eq!(report.steps[0].output, Value::Null);
        assert_eq!(report.result["args"], json!({"was": null}));
    }

    #[tokio::test]
    async fn test_missing_reference_fails_step() {
        let invoker = FakeInvoker::default();
        let code = r#"
imports: { gh: mcp/github }
steps:
  - call: gh.echo
    args: { x: "$nowhere.field" }
"#;
        let report = sandbox().execute(&invoker, code, Value::Null).await.unwrap();
        assert!(!report.success);
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_step_limit_checked_up_front() {
        let sandbox = Sandbox::new(
            sandbox().modules().clone(),
            SandboxLimits {
                max_steps: 1,
                ..SandboxLimits::default()
            },
        );
        let invoker = FakeInvoker::default();
        let code = "imports: { gh: mcp/github }\nsteps:\n  - call: gh.a\n  - call: gh.b\n";
        let err = sandbox.execute(&invoker, code, Value::Null).await.unwrap_err();
        assert!(matches!(err, MCPError::Program(_)));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_enforced() {
        let sandbox = Sandbox::new(
            sandbox().modules().clone(),
            SandboxLimits {
                timeout: Duration::from_millis(50),
                ..SandboxLimits::default()
            },
        );
        let code = "imports: { gh: mcp/github }\nsteps:\n  - call: gh.sleep\n";
        let err = sandbox
            .execute(&FakeInvoker::default(), code, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, MCPError::SandboxTimeout(_)));
    }

    #[test]
    fn test_program_validation() {
        assert!(Program::parse("   ").is_err());
        assert!(Program::parse("steps: [{call: a.b, bogus: 1}]").is_err());
        assert!(Program::parse("steps: [{name: prev, call: a.b}]").is_err());
        assert!(Program::parse("steps: [{name: x, call: a.b}, {name: x, call: a.c}]").is_err());
        assert!(Program::parse("steps: [{name: x, call: a.b, on_error: continue}]").is_ok());
    }

    #[test]
    fn test_conditions() {
        let mut scope = Scope::new(json!({"n": 2, "s": "on", "list": []}));
        scope.record(Some("step"), json!({"ok": true}));
        assert!(evaluate_condition("$input.n == 2", &scope));
        assert!(evaluate_condition("$input.s != off", &scope));
        assert!(evaluate_condition("$input.s == 'on'", &scope));
        assert!(evaluate_condition("$step.ok", &scope));
        assert!(!evaluate_condition("$input.list", &scope));
        assert!(!evaluate_condition("$input.missing", &scope));
        assert!(evaluate_condition("$prev.ok == true", &scope));
    }

    #[test]
    fn test_module_map_from_registry() {
        let registry = MCPRegistry::from_json(
            r#"{"servers": {
                "github": "gh-server",
                "db": {"command": "db-server", "sensitivity": "high"},
                "old": {"command": "old-server", "disabled": true},
                "hidden": {"command": "h", "visibility": "hidden"}
            }}"#,
        )
        .unwrap();
        let map = ModuleMap::from_registry(&registry);
        assert_eq!(map.specifiers(), vec!["mcp/github", "mcp/hidden"]);
        assert_eq!(map.resolve("mcp/github").unwrap(), "github");
        assert!(map.resolve("mcp/db").is_err());
    }
}
