//! Demo binary: one query against one CSV, chart written to plot.png.
//!
//! Usage: plotgate <csv-path> [query...]
//! Model configuration comes from the environment (PLOT_API_KEY required;
//! PANDAS_BASE_URL, PANDAS_MODEL, PANDAS_TEMPERATURE optional).

use anyhow::{bail, Context, Result};
use plotgate::{
    AllowList, ChatModelClient, ColumnRequirement, Dataset, KeywordIntent, KeywordValidator,
    LlmConfig, PlotAgent, PythonExecutor, SchemaRequirements,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plotgate=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(csv_path) = args.next() else {
        bail!("usage: plotgate <csv-path> [query...]");
    };
    let query = {
        let rest: Vec<String> = args.collect();
        if rest.is_empty() {
            "plot bar chart of sale price by country with unique color".to_string()
        } else {
            rest.join(" ")
        }
    };

    let config = LlmConfig::from_env().context("loading model configuration")?;
    let dataset = Dataset::from_csv(&csv_path).context("opening dataset")?;
    info!(columns = ?dataset.columns(), "loaded dataset");

    let schema = SchemaRequirements::new().rule(ColumnRequirement::new(
        KeywordIntent::new(["sale price"]),
        ["sale price", "country"],
    ));

    let agent = PlotAgent::new(
        Box::new(ChatModelClient::new(config)?),
        Box::new(PythonExecutor::new()?),
        KeywordValidator::new(AllowList::dataframe_plotting()),
        dataset,
    )
    .with_schema(schema);

    info!(%query, "processing query");
    match agent.process_query(&query).await {
        Ok(outcome) => {
            if let Some(stdout) = outcome.stdout {
                print!("{stdout}");
            }
            match outcome.plot_png {
                Some(png) => {
                    std::fs::write("plot.png", png)?;
                    info!("chart written to plot.png");
                }
                None => info!("query completed without producing a chart"),
            }
            Ok(())
        }
        Err(e) => {
            error!("an error occurred while processing the query: {e}");
            bail!("query failed: {e}");
        }
    }
}
