use buildrelay::tracing::{TracingConfig, init_tracing};
use buildrelay::{cli, errors, run};
use tracing::Instrument;

#[tokio::main]
async fn main() {
    let cli = cli::parse();
    let json = cli.json;

    if let Err(e) = init_tracing(TracingConfig {
        format: cli.log_format(),
        level: cli.log_level().into(),
        filter: None,
    }) {
        errors::render_error(errors::CliError::config(e.to_string()), json);
        std::process::exit(errors::EXIT_FAILURE);
    }

    let span = buildrelay::run_span!(cli.project.as_deref().unwrap_or("<default>"));
    let code = match run::execute(cli).instrument(span).await {
        Ok(code) => code,
        Err(err) => {
            let code = errors::exit_code_for(&err);
            errors::render_error(err, json);
            code
        }
    };
    std::process::exit(code);
}
