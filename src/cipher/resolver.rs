//! Cipher resolution: cache lookup, (re)assembly, batch evaluation, delivery

use crate::cipher::assemble::{AssembledProgram, ProgramAssembler};
use crate::cipher::cache::CipherCache;
use crate::cipher::evaluator::ScriptEvaluator;
use crate::cipher::task::CipherTask;
use crate::error::SigfetchError;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Budget for a single batch evaluation
    pub evaluation_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout: Duration::from_secs(5),
        }
    }
}

/// Resolves batches of [`CipherTask`]s for one script.
#[derive(Clone)]
pub struct CipherResolver {
    cache: CipherCache,
    assembler: ProgramAssembler,
    evaluator: ScriptEvaluator,
}

impl CipherResolver {
    /// Create a resolver over `cache` with default settings
    pub fn new(cache: CipherCache) -> Self {
        Self::with_config(cache, ResolverConfig::default())
    }

    /// Create a resolver with configuration
    pub fn with_config(cache: CipherCache, config: ResolverConfig) -> Self {
        Self {
            cache,
            assembler: ProgramAssembler::new(),
            evaluator: ScriptEvaluator::with_timeout(config.evaluation_timeout),
        }
    }

    /// Replace the assembler (e.g. one using a custom locator)
    pub fn with_assembler(mut self, assembler: ProgramAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Cache used by this resolver
    pub fn cache(&self) -> &CipherCache {
        &self.cache
    }

    /// Resolve every task for the script identified by `script_id`.
    ///
    /// `fetch_script` is only called when no usable cached program exists.
    /// Failures are logged and leave the tasks unresolved; the whole batch is
    /// abandoned rather than partially resolved.
    pub async fn resolve<F, Fut>(&self, script_id: &str, fetch_script: F, tasks: Vec<CipherTask>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SigfetchError>>,
    {
        if tasks.is_empty() {
            return;
        }

        let signatures: Vec<String> = tasks.iter().map(|t| t.signature().to_string()).collect();

        if let Some(program) = self.cache.lookup(script_id).await {
            match self.evaluate(program, signatures.clone()).await {
                Ok(outputs) => {
                    let resolved = deliver(tasks, outputs);
                    debug!("Resolved {} signatures from cached program", resolved);
                    return;
                }
                Err(e) => warn!("Cached cipher program failed for {}: {}", script_id, e),
            }
        } else {
            debug!("Cipher cache miss for {}", script_id);
        }

        self.cache.invalidate(script_id).await;
        match self.rebuild(script_id, fetch_script, signatures).await {
            Ok(outputs) => {
                let total = tasks.len();
                let resolved = deliver(tasks, outputs);
                info!("Resolved {} of {} signatures", resolved, total);
            }
            Err(e) => error!(
                "Failed to resolve {} signatures for {}: {}",
                tasks.len(),
                script_id,
                e
            ),
        }
    }

    async fn rebuild<F, Fut>(
        &self,
        script_id: &str,
        fetch_script: F,
        signatures: Vec<String>,
    ) -> Result<Vec<Option<String>>, SigfetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SigfetchError>>,
    {
        let script = fetch_script().await?;
        debug!("Fetched script {} ({} chars)", script_id, script.len());
        let program = self.assembler.assemble(script_id, &script)?;
        let outputs = self.evaluate(program.clone(), signatures).await?;
        if let Err(e) = self.cache.store(script_id, &program).await {
            warn!("Failed to cache cipher program for {}: {}", script_id, e);
        }
        Ok(outputs)
    }

    async fn evaluate(
        &self,
        program: AssembledProgram,
        signatures: Vec<String>,
    ) -> Result<Vec<Option<String>>, SigfetchError> {
        let evaluator = self.evaluator.clone();
        tokio::task::spawn_blocking(move || evaluator.evaluate(&program, &signatures))
            .await
            .map_err(|e| SigfetchError::Evaluation(format!("Evaluator task failed: {}", e)))?
    }
}

/// Hand outputs to tasks in order and return how many were completed.
///
/// Tasks without a usable output, or past the last output, stay unresolved.
fn deliver(tasks: Vec<CipherTask>, outputs: Vec<Option<String>>) -> usize {
    let mut resolved = 0;
    for (task, output) in tasks.into_iter().zip(outputs) {
        if let Some(output) = output {
            task.complete(&output);
            resolved += 1;
        }
    }
    resolved
}

/// Fetch a script resource as text
pub async fn fetch_script(client: &Client, url: &str) -> Result<String, SigfetchError> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}
