use sales_nl2sql::config::AppConfig;
use sales_nl2sql::generator::{MAX_ROWS, MIN_ROWS};
use sales_nl2sql::render::{render_schema, render_summary, render_table};
use sales_nl2sql::session::{Answer, Session, SAMPLE_QUESTIONS};
use sales_nl2sql::translator::TranslationMode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sales-nl2sql")]
#[command(about = "Ask natural language questions about synthetic sales data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Number of rows to generate (default: NL2SQL_ROWS or 1000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(MIN_ROWS as u64..=MAX_ROWS as u64))]
    rows: Option<u64>,

    /// Seed for reproducible data (default: NL2SQL_SEED or random)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Clone)]
struct TranslateArgs {
    /// Translation mode: "rule" or "llm"
    #[arg(short, long, default_value = "llm")]
    mode: TranslationMode,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Model name (or set OPENAI_MODEL env var)
    #[arg(long)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate one question, run it and print the result
    Ask {
        /// The question in natural language
        question: String,

        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        translate: TranslateArgs,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop
    Shell {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        translate: TranslateArgs,
    },
    /// Show column names, types and descriptions
    Schema,
    /// Show the first rows of the generated table
    Preview {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Show headline numbers for the generated dataset
    Summary {
        #[command(flatten)]
        data: DataArgs,
    },
    /// List sample questions
    Samples,
}

fn build_config(data: &DataArgs, translate: Option<&TranslateArgs>) -> Result<AppConfig> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(rows) = data.rows {
        config.row_count = rows as usize;
    }
    if data.seed.is_some() {
        config.seed = data.seed;
    }
    if let Some(translate) = translate {
        if let Some(key) = &translate.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(model) = &translate.model {
            config.model = model.clone();
        }
    }
    Ok(config)
}

fn print_answer(answer: &Answer) {
    println!("\n=== Generated SQL ===");
    println!("{}", answer.translation.sql);
    println!("Method: {}", answer.translation.method);

    match &answer.outcome {
        Ok(result) => {
            println!("\n=== Results ({} rows) ===", result.len());
            println!("{}", render_table(result));
        }
        Err(_) => {
            if let Some(message) = answer.error_message() {
                eprintln!("\n{}", message);
            }
            eprintln!("Try rephrasing your question or check the generated SQL above.");
        }
    }
}

fn print_samples() {
    println!("Sample questions:");
    for (idx, question) in SAMPLE_QUESTIONS.iter().enumerate() {
        println!("  {:>2}. {}", idx + 1, question);
    }
}

/// Parse `<rows> [seed]` for `:regen`. Any malformed or extra argument is rejected.
fn parse_regen_args(args: &str) -> Option<(usize, Option<u64>)> {
    let mut args = args.split_whitespace();
    let rows = args
        .next()?
        .parse::<usize>()
        .ok()
        .filter(|rows| (MIN_ROWS..=MAX_ROWS).contains(rows))?;
    let seed = match args.next() {
        Some(seed) => Some(seed.parse::<u64>().ok()?),
        None => None,
    };
    if args.next().is_some() {
        return None;
    }
    Some((rows, seed))
}

async fn run_shell(mut session: Session, mut mode: TranslationMode) -> Result<()> {
    println!("Loaded {} rows. Ask a question, or type :help.", session.row_count());
    println!("{}", render_summary(&session.summary()?));

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("\nquestion> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match head {
            ":quit" | ":q" | ":exit" => break,
            ":help" => {
                println!(":regen <rows> [seed]   regenerate the dataset");
                println!(":mode rule|llm         switch translation mode");
                println!(":sql <statement>       run SQL directly");
                println!(":schema  :summary  :samples  :quit");
                println!("A number picks the matching sample question.");
            }
            ":schema" => println!("{}", render_schema(session.schema())),
            ":summary" => println!("{}", render_summary(&session.summary()?)),
            ":samples" => print_samples(),
            ":mode" => match rest.parse::<TranslationMode>() {
                Ok(new_mode) => {
                    mode = new_mode;
                    println!("Mode: {:?}", mode);
                }
                Err(e) => eprintln!("{}", e),
            },
            ":regen" => match parse_regen_args(rest) {
                Some((rows, seed)) => match session.regenerate(rows, seed) {
                    Ok(()) => println!("Generated {} rows!", rows),
                    Err(e) => eprintln!("Error: {}", e),
                },
                None => eprintln!("Usage: :regen <rows {}-{}> [seed]", MIN_ROWS, MAX_ROWS),
            },
            ":sql" => match session.run_sql(rest) {
                Ok(result) => println!("{}", render_table(&result)),
                Err(e) => eprintln!("Error: {}", e),
            },
            _ => {
                let question = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| SAMPLE_QUESTIONS.get(idx).copied())
                    .unwrap_or(input);
                if question != input {
                    println!("Question: {}", question);
                }
                let answer = session.ask(question, mode).await;
                print_answer(&answer);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sales_nl2sql=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            data,
            translate,
            json,
        } => {
            let config = build_config(&data, Some(&translate))?;
            let session = Session::new(&config)?;
            info!(session = %session.id(), "answering question");
            let answer = session.ask(&question, translate.mode).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Shell { data, translate } => {
            let config = build_config(&data, Some(&translate))?;
            let session = Session::new(&config)?;
            run_shell(session, translate.mode).await?;
        }
        Commands::Schema => {
            let store = sales_nl2sql::TabularStore::open()?;
            println!("{}", render_schema(&store.schema()?));
        }
        Commands::Preview { limit, data } => {
            let config = build_config(&data, None)?;
            let session = Session::new(&config)?;
            println!("{}", render_table(&session.store().preview(limit)?));
        }
        Commands::Summary { data } => {
            let config = build_config(&data, None)?;
            let session = Session::new(&config)?;
            println!("{}", render_summary(&session.summary()?));
        }
        Commands::Samples => print_samples(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regen_args() {
        assert_eq!(parse_regen_args("500"), Some((500, None)));
        assert_eq!(parse_regen_args("500 42"), Some((500, Some(42))));
        assert_eq!(parse_regen_args(""), None);
        assert_eq!(parse_regen_args("10"), None);
        assert_eq!(parse_regen_args("lots"), None);
    }

    #[test]
    fn test_regen_rejects_bad_seed() {
        assert_eq!(parse_regen_args("500 4x2"), None);
        assert_eq!(parse_regen_args("500 -1"), None);
        assert_eq!(parse_regen_args("500 42 7"), None);
    }
}
