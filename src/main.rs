use anyhow::Result;
use fintrack_llm::cli::{Args, ConfigDiscovery, ExecutionMode, GenerateConfig};
use fintrack_llm::{InMemoryStore, LlmService};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "fintrack_llm=debug"
    } else {
        "fintrack_llm=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mode = args.mode().map_err(anyhow::Error::msg)?;

    match mode {
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
        ExecutionMode::InitConfig => {
            let path = ConfigDiscovery::create_default_user_config()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
        mode => {
            let config = ConfigDiscovery::load(args.config.as_deref())?;
            info!(provider = %config.provider, "Configuration loaded");
            // State lives for this process only.
            let service = LlmService::new(config, Arc::new(InMemoryStore::new()));
            run_with_service(&service, mode).await
        }
    }
}

async fn run_with_service(service: &LlmService, mode: ExecutionMode) -> Result<()> {
    match mode {
        ExecutionMode::Generate(config) => run_generate(service, config).await,
        ExecutionMode::Embed { provider, text } => {
            let embedding = service
                .generate_embeddings(provider.as_deref(), "", &text)
                .await?;
            println!("{}", serde_json::to_string(&embedding)?);
            Ok(())
        }
        ExecutionMode::Status { provider, subject } => {
            let status = service.status(provider.as_deref(), &subject).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        ExecutionMode::ResetCircuit { provider } => {
            service.reset_circuit(provider.as_deref()).await?;
            println!("Circuit reset");
            Ok(())
        }
        ExecutionMode::ShowConfig | ExecutionMode::InitConfig => Ok(()),
    }
}

async fn run_generate(service: &LlmService, config: GenerateConfig) -> Result<()> {
    let provider = config.provider.as_deref();

    if config.json {
        let value = service
            .generate_structured_output(
                provider,
                &config.subject,
                &config.prompt,
                "json",
                &config.options,
            )
            .await?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let text = service
            .generate_text(provider, &config.subject, &config.prompt, &config.options)
            .await?;
        println!("{}", text);
    }
    Ok(())
}
