//! Batched evaluation of assembled cipher programs in a disposable JS runtime

use crate::cipher::assemble::AssembledProgram;
use crate::error::SigfetchError;
use deno_core::{v8, FastString, JsRuntime, RuntimeOptions};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Delimiter between outputs of one batch
const OUTPUT_DELIMITER: &str = "\n";

/// Runs an [`AssembledProgram`] over a batch of signatures
#[derive(Debug, Clone)]
pub struct ScriptEvaluator {
    timeout: Duration,
}

impl ScriptEvaluator {
    /// Create an evaluator with a 5 second budget per call
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    /// Create an evaluator with a custom budget per call
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build the program text whose completion value is every output joined
    /// by [`OUTPUT_DELIMITER`].
    pub fn batch_source(program: &AssembledProgram, signatures: &[String]) -> Result<String, SigfetchError> {
        let calls = signatures
            .iter()
            .map(|signature| {
                serde_json::to_string(signature)
                    .map(|literal| format!("String({}({}))", program.dispatcher, literal))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delimiter = serde_json::to_string(OUTPUT_DELIMITER)?;
        Ok(format!(
            "{}\n[{}].join({});",
            program.code,
            calls.join(","),
            delimiter
        ))
    }

    /// Evaluate `program` once for all `signatures`.
    ///
    /// Outputs come back in input order. If the program yields fewer outputs
    /// than inputs, only the leading outputs are returned. An empty or
    /// `undefined` output is `None`; a batch with no usable output at all is
    /// an error.
    pub fn evaluate(
        &self,
        program: &AssembledProgram,
        signatures: &[String],
    ) -> Result<Vec<Option<String>>, SigfetchError> {
        if signatures.is_empty() {
            return Ok(Vec::new());
        }

        let source = Self::batch_source(program, signatures)?;
        debug!(
            "Evaluating {} for {} signatures ({} chars)",
            program.dispatcher,
            signatures.len(),
            source.len()
        );

        let mut runtime = JsRuntime::new(RuntimeOptions::default());
        let isolate = runtime.v8_isolate().thread_safe_handle();

        // Watchdog terminates the isolate once the budget is spent
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let timeout = self.timeout;
        let watchdog = thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                isolate.terminate_execution();
                return true;
            }
            false
        });

        let result = runtime.execute_script("<cipher>", FastString::from(source));
        let _ = done_tx.send(());
        let timed_out = watchdog.join().unwrap_or(false);

        let value = match result {
            Ok(value) => value,
            Err(_) if timed_out => return Err(SigfetchError::EvaluationTimeout(timeout)),
            Err(e) => {
                return Err(SigfetchError::Evaluation(format!(
                    "Cipher program execution error: {:?}",
                    e
                )))
            }
        };

        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        if !local.is_string() {
            return Err(SigfetchError::Evaluation(
                "Cipher program did not produce a string".to_string(),
            ));
        }
        let joined = local.to_rust_string_lossy(scope);

        let outputs: Vec<Option<String>> = joined
            .split(OUTPUT_DELIMITER)
            .take(signatures.len())
            .map(usable_output)
            .collect();
        if outputs.iter().all(Option::is_none) {
            return Err(SigfetchError::Evaluation(format!(
                "{} produced no usable output",
                program.dispatcher
            )));
        }
        if outputs.len() < signatures.len() {
            debug!(
                "Cipher program returned {} of {} outputs",
                outputs.len(),
                signatures.len()
            );
        }
        Ok(outputs)
    }
}

/// A dispatcher that forgot to return yields "undefined" after `String()`
fn usable_output(raw: &str) -> Option<String> {
    match raw {
        "" | "undefined" | "null" => None,
        value => Some(value.to_string()),
    }
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
