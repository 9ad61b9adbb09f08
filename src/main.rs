use std::future::Future;
use std::process::ExitCode;

use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use mdc_uploader::cli::{Cli, Commands};
use mdc_uploader::commands::{
    self, DriveOptions, PreviewPage, TaskStatus, UploadOutcome, UploadRequest,
};
use mdc_uploader::config::AppConfig;
use mdc_uploader::error::AppError;
use mdc_uploader::events::{NoticeLevel, Notifier, WizardEvent};
use mdc_uploader::state::AppState;
use mdc_uploader::storage::dashboard::time_ago;
use mdc_uploader::storage::records::current_timestamp;
use mdc_uploader::workflow::{Step, StepStatus};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// `MDC_LOG`, then `RUST_LOG`, then `warn` (`info` with `--verbose`).
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = std::env::var("MDC_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<(), AppError> {
    let state = AppState::init(AppConfig::from_env()?).await?;
    state.restore_session().await;

    match command {
        Commands::Login { email, password } => {
            let user = commands::login(&state, &email, &SecretString::from(password)).await?;
            println!("Signed in as {} <{}>", user.username, user.email);
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            let user = commands::register(&state, &username, &email, &SecretString::from(password)).await?;
            println!("Created account {}. Sign in with `mdc-uploader login`.", user.username);
        }
        Commands::Logout => {
            commands::logout(&state).await?;
            println!("Signed out.");
        }
        Commands::Whoami => {
            let user = commands::whoami(&state).await?;
            println!("{} <{}> (id {})", user.username, user.email, user.id);
        }
        Commands::ChangePassword { current, new } => {
            commands::change_password(&state, &SecretString::from(current), &SecretString::from(new)).await?;
            println!("Password changed.");
        }
        Commands::Upload {
            file,
            source,
            sheet,
            pause_at_execute,
            output,
        } => {
            let request = UploadRequest { file, source, sheet };
            let options = DriveOptions {
                pause_at_execute,
                export_to: output,
            };
            let outcome = with_events(|notifier| commands::upload(&state, &request, &options, notifier)).await?;
            print_outcome(outcome.as_ref());
        }
        Commands::Resume {
            task_id,
            pause_at_execute,
            output,
        } => {
            let options = DriveOptions {
                pause_at_execute,
                export_to: output,
            };
            let outcome = with_events(|notifier| {
                commands::resume(&state, task_id.as_deref(), &options, notifier)
            })
            .await?;
            print_outcome(outcome.as_ref());
        }
        Commands::Status { page } => match commands::status(&state, page).await? {
            Some(status) => print_status(&status),
            None => println!("No upload in progress."),
        },
        Commands::Pause => {
            let record = commands::pause(&state).await?;
            println!(
                "Saved {} at \"{}\". Continue with `mdc-uploader resume --task-id {}`.",
                record.file_name,
                Step::clamped(record.current_step),
                record.task_id
            );
        }
        Commands::History => {
            let records = commands::history(&state).await?;
            if records.is_empty() {
                println!("No uploads yet.");
            }
            let now = current_timestamp();
            for r in records {
                println!(
                    "{}  {:<9}  step {}  {}  {}  {} rows  {}",
                    r.task_id,
                    r.status.label(),
                    r.current_step + 1,
                    r.file_name,
                    r.file_size,
                    r.total_rows,
                    time_ago(r.created_at, now)
                );
            }
        }
        Commands::Dashboard => {
            let metrics = commands::dashboard(&state).await?;
            println!("Total uploads:    {}", metrics.total_uploads);
            println!("Successful:       {}", metrics.successful_uploads);
            println!("Paused or failed: {}", metrics.failed_uploads);
            println!("Rows processed:   {}", metrics.data_processed);
            if !metrics.recent_uploads.is_empty() {
                println!("\nRecent uploads:");
                for upload in metrics.recent_uploads {
                    println!("  {}  {}  {}", upload.file_name, upload.file_size, upload.time_ago);
                }
            }
        }
        Commands::Notebooks => {
            for notebook in commands::notebooks(&state).await? {
                println!("{}", notebook.path);
            }
        }
        Commands::RunStatus { run_id } => {
            let report = commands::run_status(&state, run_id).await?;
            println!(
                "Run {}: {} ({}%), result {}",
                report.run_id, report.status, report.progress, report.result
            );
            if !report.message.is_empty() {
                println!("  {}", report.message);
            }
        }
    }

    Ok(())
}

/// Runs a wizard command while printing its events. Returns `None` when
/// interrupted with Ctrl-C; the snapshot is kept for `resume`.
async fn with_events<F, Fut, T>(command: F) -> Result<Option<T>, AppError>
where
    F: FnOnce(Notifier) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let (notifier, mut events) = Notifier::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let result = tokio::select! {
        result = command(notifier) => result.map(Some),
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. Continue later with `mdc-uploader resume`.");
            Ok(None)
        }
    };

    let _ = printer.await;
    result
}

fn print_event(event: &WizardEvent) {
    match event {
        WizardEvent::StepChanged { to, .. } => {
            if let Some(step) = Step::from_index(*to) {
                println!("==> {}", step);
            }
        }
        WizardEvent::TransferProgress { percent } => println!("    uploaded {:>3}%", percent),
        WizardEvent::ExecuteProgress { status, progress } => {
            println!("    notebook {} ({}%)", status, progress)
        }
        // Errors are printed once, from the command result.
        WizardEvent::Notice {
            level: NoticeLevel::Error,
            ..
        } => {}
        WizardEvent::Notice { title, message, .. } => println!("    {}: {}", title, message),
    }
}

fn print_outcome(outcome: Option<&UploadOutcome>) {
    match outcome {
        Some(UploadOutcome::Completed {
            record,
            result_rows,
            result_preview,
            exported_to,
        }) => {
            println!("Processed {} ({} result rows).", record.file_name, result_rows);
            print_page(result_preview);
            if let Some(path) = exported_to {
                println!("Result written to {}", path.display());
            }
        }
        Some(UploadOutcome::Paused { record }) => println!(
            "Saved {}. Continue with `mdc-uploader resume --task-id {}`.",
            record.file_name, record.task_id
        ),
        None => {}
    }
}

fn print_status(status: &TaskStatus) {
    println!("Task {}", status.task_id);
    for step in &status.steps {
        let marker = match step.status {
            StepStatus::Completed => "x",
            StepStatus::Active => ">",
            StepStatus::Pending => " ",
        };
        println!("  [{}] {}. {}", marker, step.index + 1, step.title);
    }

    let summary = &status.summary;
    println!(
        "\n{} ({}), {} rows, {} columns, source {}",
        summary.file_name, summary.file_size, summary.rows, summary.columns, summary.source
    );
    if status.upload_completed {
        println!("File uploaded to storage.");
    }

    print_page(&status.preview);
}

fn print_page(page: &PreviewPage) {
    if page.columns.is_empty() {
        return;
    }
    println!("\n{}", page.columns.join(" | "));
    for row in &page.rows {
        println!("{}", row.join(" | "));
    }
    println!("(page {} of {})", page.number, page.total_pages);
}

fn print_error(err: &AppError) {
    let presentation = err.to_presentation();
    eprintln!("error: {}: {}", presentation.title, presentation.message);
    if let Some(action) = presentation.action {
        eprintln!("  {}", action);
    }
}
