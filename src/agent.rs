//! Orchestrates one visualization query end to end.
//!
//! Pipeline per query: schema requirements check → model call → snippet
//! extraction → allow-list validation → sandboxed execution. Exactly one
//! attempt; every failure comes back as a typed [`PlotError`] value and the
//! host process never crashes. The snippet reaches the executor only after
//! validation passed (fail-closed).

use tracing::{info, warn};

use crate::data::Dataset;
use crate::errors::{PlotError, Result};
use crate::executor::{ExecutionNamespace, ExecutionOutcome, SnippetExecutor};
use crate::extractor::extract_snippet;
use crate::llm::LanguageModel;
use crate::schema::SchemaRequirements;
use crate::validator::KeywordValidator;

const SYSTEM_ROLE: &str = "You are a data visualization assistant. Respond with a single \
Python code block that operates on the provided DataFrame.";

pub struct PlotAgent {
    model: Box<dyn LanguageModel>,
    executor: Box<dyn SnippetExecutor>,
    validator: KeywordValidator,
    schema: SchemaRequirements,
    dataset: Dataset,
}

impl PlotAgent {
    pub fn new(
        model: Box<dyn LanguageModel>,
        executor: Box<dyn SnippetExecutor>,
        validator: KeywordValidator,
        dataset: Dataset,
    ) -> Self {
        Self {
            model,
            executor,
            validator,
            schema: SchemaRequirements::new(),
            dataset,
        }
    }

    pub fn with_schema(mut self, schema: SchemaRequirements) -> Self {
        self.schema = schema;
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Prompt suffix pinning the exact column names, so the model uses
    /// `df['column name']` syntax for names with spaces.
    fn build_prompt(&self, query: &str) -> String {
        let columns = self
            .dataset
            .columns()
            .iter()
            .map(|c| format!("'{c}'"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{query}\n\nYou are working with a DataFrame named df. The exact column names \
             are: {columns}. Use df['column name'] syntax for column names with spaces. \
             The names df, pd and plt are already bound; do not import anything. \
             Generate Matplotlib plots where applicable."
        )
    }

    /// Process one query. One model call, one execution attempt, no retry.
    pub async fn process_query(&self, query: &str) -> Result<ExecutionOutcome> {
        info!(%query, "processing query");
        self.schema.validate(query, &self.dataset)?;

        let response = self
            .model
            .generate(SYSTEM_ROLE, &self.build_prompt(query))
            .await?;
        let output = response.output.as_deref().unwrap_or("");

        let snippet = extract_snippet(output).ok_or(PlotError::ExtractionEmpty)?;
        info!(code = %snippet, "generated code");

        if let Err(err) = self.validator.validate(&snippet) {
            warn!("rejected generated code: {err}");
            return Err(err);
        }

        let namespace = ExecutionNamespace::for_dataframe(self.dataset.csv_path());
        self.executor.execute(&snippet, namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NamespaceValue;
    use crate::llm::ModelResponse;
    use crate::validator::AllowList;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubModel {
        output: Option<String>,
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<ModelResponse> {
            Ok(ModelResponse {
                output: self.output.clone(),
            })
        }
    }

    /// Records executed snippets instead of running them.
    #[derive(Default)]
    struct SpyExecutor {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SnippetExecutor for SpyExecutor {
        async fn execute(
            &self,
            snippet: &crate::extractor::CodeSnippet,
            namespace: ExecutionNamespace,
        ) -> Result<ExecutionOutcome> {
            assert!(matches!(
                namespace.names().collect::<Vec<_>>().as_slice(),
                ["df", "pd", "plt"]
            ));
            self.executed
                .lock()
                .unwrap()
                .push(snippet.as_str().to_string());
            Ok(ExecutionOutcome {
                plot_png: Some(vec![0x89, b'P', b'N', b'G']),
                stdout: None,
            })
        }
    }

    fn agent(output: Option<&str>) -> (PlotAgent, &'static SpyExecutor) {
        let spy: &'static SpyExecutor = Box::leak(Box::new(SpyExecutor::default()));
        struct Borrowed(&'static SpyExecutor);
        #[async_trait]
        impl SnippetExecutor for Borrowed {
            async fn execute(
                &self,
                snippet: &crate::extractor::CodeSnippet,
                namespace: ExecutionNamespace,
            ) -> Result<ExecutionOutcome> {
                self.0.execute(snippet, namespace).await
            }
        }
        let dataset = Dataset::with_columns(
            "/tmp/houses.csv",
            vec!["sale price".to_string(), "country".to_string()],
        );
        let agent = PlotAgent::new(
            Box::new(StubModel {
                output: output.map(str::to_string),
            }),
            Box::new(Borrowed(spy)),
            KeywordValidator::new(AllowList::dataframe_plotting()),
            dataset,
        );
        (agent, spy)
    }

    #[tokio::test]
    async fn allowed_snippet_is_executed() {
        let code = "df['sale price'].groupby(df['country']).mean().plot(kind='bar')";
        let (agent, spy) = agent(Some(&format!("Here you go:\n```python\n{code}\n```")));
        let outcome = agent.process_query("plot sale price by country").await.unwrap();
        assert!(outcome.plot_png.is_some());
        assert_eq!(*spy.executed.lock().unwrap(), vec![code.to_string()]);
    }

    #[tokio::test]
    async fn rejected_snippet_never_reaches_executor() {
        let (agent, spy) =
            agent(Some("```python\nimport os; os.system('rm -rf /')\n```"));
        let err = agent.process_query("delete everything").await.unwrap_err();
        match err {
            PlotError::ValidationRejected(tokens) => {
                assert!(tokens.contains(&"os".to_string()));
                assert!(tokens.contains(&"system".to_string()));
            }
            other => panic!("expected ValidationRejected, got {other}"),
        }
        assert!(spy.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prose_response_is_extraction_empty() {
        let (agent, spy) = agent(Some("Here is your chart idea but no code."));
        let err = agent.process_query("plot something").await.unwrap_err();
        assert!(matches!(err, PlotError::ExtractionEmpty));
        assert!(spy.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn absent_output_is_extraction_empty() {
        let (agent, spy) = agent(None);
        let err = agent.process_query("plot something").await.unwrap_err();
        assert!(matches!(err, PlotError::ExtractionEmpty));
        assert!(spy.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_check_runs_before_the_model_call() {
        use crate::schema::{ColumnRequirement, KeywordIntent};
        let (agent, spy) = agent(Some("```python\ndf.plot()\n```"));
        let agent = agent.with_schema(SchemaRequirements::new().rule(ColumnRequirement::new(
            KeywordIntent::new(["inventory"]),
            ["warehouse"],
        )));
        let err = agent.process_query("plot inventory levels").await.unwrap_err();
        assert!(matches!(err, PlotError::MissingColumns(_)));
        assert!(spy.executed.lock().unwrap().is_empty());
    }

    #[test]
    fn prompt_pins_exact_column_names() {
        let (agent, _) = agent(None);
        let prompt = agent.build_prompt("plot sale price by country");
        assert!(prompt.contains("'sale price', 'country'"));
        assert!(prompt.contains("df['column name']"));
    }

    #[test]
    fn namespace_values_are_constructible() {
        // Scalar bindings are part of the public surface even though the
        // default pipeline only binds df/pd/plt.
        let ns = ExecutionNamespace::new().bind("limit", NamespaceValue::Scalar(5.into()));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["limit"]);
    }
}
