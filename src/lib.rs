//! plotgate: a safe execution gate for model-generated plotting code.
//!
//! Takes a natural-language visualization request, asks a language model for
//! Python plotting code against a tabular dataset, and gates that untrusted
//! code before running it:
//!
//! 1. [`extractor`] pulls a single code block out of the model's free text.
//! 2. [`validator`] checks the snippet's functionality surface against an
//!    allow list (fail-closed, whole-token matching).
//! 3. [`executor`] runs the validated snippet in a Python subprocess whose
//!    globals are exactly the [`ExecutionNamespace`], with restricted
//!    builtins, a wall-clock timeout, and Unix resource limits.
//!
//! The allow-list check is lexical, not a sandbox: it is intentionally
//! permissive about syntax and restrictive about which library methods may be
//! invoked. Known bypasses (string indirection, getattr-equivalents) are
//! accepted limitations; deployments handling hostile input need OS-level
//! isolation underneath.
//!
//! # Example
//! ```rust,no_run
//! use plotgate::{
//!     AllowList, ChatModelClient, Dataset, KeywordValidator, LlmConfig, PlotAgent,
//!     PythonExecutor,
//! };
//!
//! # async fn demo() -> plotgate::Result<()> {
//! let dataset = Dataset::from_csv("houses.csv")?;
//! let agent = PlotAgent::new(
//!     Box::new(ChatModelClient::new(LlmConfig::from_env()?)?),
//!     Box::new(PythonExecutor::new()?),
//!     KeywordValidator::new(AllowList::dataframe_plotting()),
//!     dataset,
//! );
//! let outcome = agent
//!     .process_query("plot bar chart of sale price by country")
//!     .await?;
//! if let Some(png) = outcome.plot_png {
//!     std::fs::write("plot.png", png)?;
//! }
//! # Ok(())
//! # }
//! ```

mod agent;
mod config;
mod data;
mod errors;
mod executor;
mod extractor;
mod llm;
mod schema;
mod validator;

pub use agent::PlotAgent;
pub use config::LlmConfig;
pub use data::Dataset;
pub use errors::{PlotError, Result};
pub use executor::{
    ExecutionNamespace, ExecutionOutcome, NamespaceValue, PythonExecutor, ResourceLimits,
    SnippetExecutor,
};
pub use extractor::{extract_snippet, CodeSnippet};
pub use llm::{ChatModelClient, LanguageModel, ModelResponse};
pub use schema::{ColumnRequirement, IntentMatcher, KeywordIntent, SchemaRequirements};
pub use validator::{AllowList, KeywordValidator};
