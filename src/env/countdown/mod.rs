//! Arithmetic-equation puzzle
//!
//! Each episode draws `num_operands` digits, chains them into a hidden
//! ground-truth equation with random operators and brackets, and publishes
//! only its value and the digits. The agent submits equations through the
//! `test_equation` tool; they are checked with the restricted evaluator in
//! `expr`, never executed.

pub mod expr;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{decode_options, select_single_call, with_error_prefix, Environment, ResetOutcome, StepResult};
use crate::config::CountdownConfig;
use crate::error::{EnvError, Result};
use crate::items::{Action, Info, ObservationMessage, ResetOptions};
use crate::tool::{decode_arguments, ToolSchema};

pub use expr::{evaluate, ExprError};

const TOOL_NAME: &str = "test_equation";
const BRACKET_PROBABILITY: f64 = 0.2;
const MAX_EQUATION_DRAWS: usize = 100;

/// Arguments of the `test_equation` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TestEquationArgs {
    /// Equation built from the provided numbers
    pub equation: String,
}

/// Outcome of one submitted equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "parsing error")]
    ParsingError,
}

/// One submitted equation and its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub tool_id: String,
    pub equation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval: Option<f64>,
    pub result: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Arithmetic-equation puzzle.
pub struct CountdownEnv {
    config: CountdownConfig,
    tool: ToolSchema,
    rng: StdRng,
    numbers: Vec<u32>,
    target: f64,
    ground_truth: String,
    attempts: Vec<Attempt>,
}

impl CountdownEnv {
    pub fn new(config: CountdownConfig) -> Result<Self> {
        config.validate()?;
        let mut tool = ToolSchema::typed::<TestEquationArgs>(
            TOOL_NAME,
            "Submit an equation using the provided numbers and operations to reach the target number",
        )?;
        tool.parameters["properties"]["equation"]["description"] = json!(format!(
            "A mathematical equation using the provided numbers and operations {} that evaluates to the target number. Brackets are allowed. For example: '5 + 3 * 2' or '(1 + 2) / 3'",
            operations_list(&config.operations)
        ));
        Ok(Self {
            numbers: vec![0; config.num_operands],
            config,
            tool,
            rng: StdRng::from_entropy(),
            target: 0.0,
            ground_truth: String::new(),
            attempts: Vec::new(),
        })
    }

    pub fn from_kwargs(kwargs: Option<Value>) -> Result<Self> {
        Self::new(decode_options(kwargs)?)
    }

    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// The hidden equation the target was computed from.
    pub fn ground_truth(&self) -> &str {
        &self.ground_truth
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    fn draw_equation(&mut self) -> Result<(String, f64)> {
        for _ in 0..MAX_EQUATION_DRAWS {
            let mut operands: Vec<String> = self.numbers.iter().map(u32::to_string).collect();
            operands.shuffle(&mut self.rng);

            while self.rng.gen::<f64>() < BRACKET_PROBABILITY {
                let left = self.rng.gen_range(0..operands.len() - 1);
                let right = self.rng.gen_range(left + 1..operands.len());
                operands[left] = format!("({}", operands[left]);
                operands[right] = format!("{})", operands[right]);
            }

            let mut equation = operands[0].clone();
            for operand in &operands[1..] {
                let op = self
                    .config
                    .operations
                    .choose(&mut self.rng)
                    .map_or("+", String::as_str);
                equation = format!("{equation} {op} {operand}");
            }

            match evaluate(&equation) {
                Ok(value) => return Ok((equation, value)),
                Err(err) => debug!(%equation, error = %err, "Redrawing ground-truth equation"),
            }
        }
        Err(EnvError::InvalidConfig(format!(
            "no evaluable equation after {MAX_EQUATION_DRAWS} draws with operations {}",
            operations_list(&self.config.operations)
        )))
    }

    fn info(&self) -> Info {
        let mut info = Info::new();
        info.insert("attempts".into(), json!(self.attempts));
        info.insert("target_num".into(), json!(self.target));
        info.insert("numbers".into(), json!(self.numbers));
        info
    }

    fn observation(&self, warning: Option<&str>) -> ObservationMessage {
        let Some(attempt) = self.attempts.last() else {
            return ObservationMessage::user(with_error_prefix(
                warning,
                "No attempts yet. Let's start!",
            ));
        };
        let target = format_number(self.target);
        let body = match (attempt.result, attempt.eval) {
            (Verdict::Pass, Some(value)) => format!(
                "Tried equation: {} = {}, which equals the target number {target} and passes the task.",
                attempt.equation,
                format_number(value)
            ),
            (Verdict::Fail, Some(value)) => format!(
                "Tried equation: {} = {}, which does not equal the target number {target} and fails the task.",
                attempt.equation,
                format_number(value)
            ),
            _ => format!(
                "Tried equation: {}, which is not a well formulated equation and got parsing error: {}",
                attempt.equation,
                attempt.error.as_deref().unwrap_or("unknown error")
            ),
        };
        ObservationMessage::tool(attempt.tool_id.clone(), with_error_prefix(warning, &body))
    }

    fn reject(&self, call_id: &str, message: String) -> StepResult {
        warn!(error = %message, "Rejected countdown action");
        StepResult::rejected(call_id, message, "No equation was tested.", self.info())
    }
}

#[async_trait]
impl Environment for CountdownEnv {
    async fn reset(
        &mut self,
        seed: Option<u64>,
        _options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.numbers = (0..self.config.num_operands)
            .map(|_| self.rng.gen_range(1..=9))
            .collect();
        let (equation, target) = self.draw_equation()?;
        self.ground_truth = equation;
        self.target = target;
        self.attempts.clear();

        Ok(ResetOutcome {
            observation: vec![self.observation(None)],
            info: self.info(),
        })
    }

    async fn step(&mut self, action: &Action) -> Result<StepResult> {
        let Some((call, warning)) = select_single_call(action) else {
            return Ok(StepResult::finished(self.info()));
        };
        if call.function.name != TOOL_NAME {
            return Ok(self.reject(
                &call.id,
                format!(
                    "Unknown tool '{}'. The only available tool is {TOOL_NAME}",
                    call.function.name
                ),
            ));
        }
        let args: TestEquationArgs = match decode_arguments(call) {
            Ok(args) => args,
            Err(err) => {
                return Ok(self.reject(&call.id, format!("Invalid arguments for {TOOL_NAME}: {err}")))
            }
        };

        let attempt = match evaluate(&args.equation) {
            Ok(value) => Attempt {
                tool_id: call.id.clone(),
                equation: args.equation,
                eval: Some(value),
                result: if value == self.target {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                },
                error: None,
            },
            Err(err) => Attempt {
                tool_id: call.id.clone(),
                equation: args.equation,
                eval: None,
                result: Verdict::ParsingError,
                error: Some(err.to_string()),
            },
        };
        let passed = attempt.result == Verdict::Pass;
        debug!(equation = %attempt.equation, result = ?attempt.result, "Countdown attempt");
        self.attempts.push(attempt);

        let truncated = !passed
            && self
                .config
                .max_attempts
                .is_some_and(|max| self.attempts.len() >= max);

        let mut info = self.info();
        if let Some(warning) = &warning {
            info.insert("error".into(), json!(warning));
        }
        Ok(StepResult {
            observation: vec![self.observation(warning.as_deref())],
            reward: if passed { 1.0 } else { 0.0 },
            done: passed,
            truncated,
            info,
        })
    }

    fn task_prompt(&self) -> String {
        let numbers: Vec<String> = self.numbers.iter().map(u32::to_string).collect();
        format!(
            "Your task is to find an equation using {} numbers and arithmetic operators {} that equals {}.\n\
             The numbers you must use are: {}\n\
             You must use each number exactly once. Brackets are allowed.\n\
             Provide your answer as a valid mathematical equation.",
            self.config.num_operands,
            operations_list(&self.config.operations),
            format_number(self.target),
            numbers.join(", ")
        )
    }

    fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        Ok(vec![self.tool.clone()])
    }
}

fn operations_list(operations: &[String]) -> String {
    format!("({})", operations.join(", "))
}

/// Integral values print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{function_call, Role};
    use pretty_assertions::assert_eq;

    fn submit(equation: &str) -> Action {
        let arguments = json!({ "equation": equation }).to_string();
        Action::with_tool_calls(vec![function_call("call_eq", TOOL_NAME, arguments)])
    }

    async fn seeded_env(config: CountdownConfig) -> CountdownEnv {
        let mut env = CountdownEnv::new(config).unwrap();
        env.reset(Some(42), None).await.unwrap();
        env
    }

    #[tokio::test]
    async fn test_reset_is_deterministic_and_hides_equation() {
        let a = seeded_env(CountdownConfig::default()).await;
        let b = seeded_env(CountdownConfig::default()).await;
        assert_eq!(a.numbers(), b.numbers());
        assert_eq!(a.ground_truth(), b.ground_truth());
        assert_eq!(a.numbers().len(), 6);
        assert!(a.numbers().iter().all(|n| (1..=9).contains(n)));

        let info = a.info();
        assert!(info.contains_key("target_num"));
        assert!(!info.values().any(|v| v == &json!(a.ground_truth())));
    }

    #[tokio::test]
    async fn test_ground_truth_passes() {
        let mut env = seeded_env(CountdownConfig::default()).await;
        let equation = env.ground_truth().to_string();
        let result = env.step(&submit(&equation)).await.unwrap();
        assert_eq!(result.reward, 1.0);
        assert!(result.done);
        assert!(!result.truncated);
        let message = &result.observation[0];
        assert_eq!(message.role, Role::Tool);
        assert!(message.content.contains("passes the task"));
    }

    #[tokio::test]
    async fn test_division_by_zero_is_a_parsing_error() {
        let mut env = seeded_env(CountdownConfig::default()).await;
        let result = env.step(&submit("1/0")).await.unwrap();
        assert_eq!(result.reward, 0.0);
        assert!(!result.done);
        assert!(result.observation[0].content.contains("parsing error"));
        assert_eq!(env.attempts()[0].result, Verdict::ParsingError);
        assert_eq!(result.info["attempts"][0]["result"], json!("parsing error"));
    }

    #[tokio::test]
    async fn test_max_attempts_truncates() {
        let mut env = seeded_env(CountdownConfig {
            max_attempts: Some(2),
            ..Default::default()
        })
        .await;
        let wrong = format!("{} + 1000", format_number(env.target()));
        assert!(!env.step(&submit(&wrong)).await.unwrap().truncated);
        let last = env.step(&submit(&wrong)).await.unwrap();
        assert!(last.truncated);
        assert!(!last.done);
    }

    #[tokio::test]
    async fn test_no_tool_call_ends_episode() {
        let mut env = seeded_env(CountdownConfig::default()).await;
        let result = env.step(&Action::text("I give up")).await.unwrap();
        assert!(result.done);
        assert!(result.observation.is_empty());
    }

    #[tokio::test]
    async fn test_bad_calls_are_rejected_without_attempt() {
        let mut env = seeded_env(CountdownConfig::default()).await;
        let wrong_tool = Action::with_tool_calls(vec![function_call("c", "solve", "{}")]);
        let result = env.step(&wrong_tool).await.unwrap();
        assert!(!result.done);
        assert!(result.info.contains_key("error"));

        let bad_args = Action::with_tool_calls(vec![function_call("c", TOOL_NAME, "{\"eq\": 1}")]);
        let result = env.step(&bad_args).await.unwrap();
        assert!(result.info["error"].as_str().unwrap().contains("Invalid arguments"));
        assert!(env.attempts().is_empty());
    }

    #[test]
    fn test_schema_mentions_operations() {
        let env = CountdownEnv::new(CountdownConfig::default()).unwrap();
        let tools = env.action_schema().unwrap();
        assert_eq!(tools[0].name, "test_equation");
        let description = tools[0].parameters["properties"]["equation"]["description"]
            .as_str()
            .unwrap();
        assert!(description.contains("(+, -, *, /)"));
        assert_eq!(tools[0].parameters["required"], json!(["equation"]));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
    }
}
