use anyhow::Result;
use maintdash::{
    auth::{AuthState, AuthorizeRequest},
    config::Config,
    navigation::LogNavigator,
    server::CallbackListener,
    App, CallbackOutcome,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "Usage: maintdash <login|logout|status|deployments|env <project>|health>";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let config = Config::load()?;
    init_logging(&config);
    config.validate();

    info!("maintdash v{}", maintdash::VERSION);

    let app = App::new(config, Arc::new(LogNavigator))?;

    match args[1].as_str() {
        "login" => login(&app).await?,

        "logout" => {
            app.session.logout();
            println!("\n✅ Logged out, session cleared\n");
        }

        "status" => {
            let state = app.session.initialize().await;
            print_status(&state);
        }

        "deployments" => {
            require_session(&app).await;

            match app.dashboard.deployments().await {
                Ok(deployments) if deployments.is_empty() => println!("No deployments found."),
                Ok(deployments) => {
                    println!("\n📦 Deployments");
                    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
                    for deployment in deployments {
                        println!("  {:<24} {}", deployment.name, deployment.repo_url);
                    }
                    println!();
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }

        "env" => {
            let Some(project) = args.get(2) else {
                eprintln!("Usage: maintdash env <project>");
                std::process::exit(1);
            };

            require_session(&app).await;

            match app.dashboard.project_env(project).await {
                Ok(vars) if vars.is_empty() => println!("No environment variables found."),
                Ok(vars) => {
                    println!("\n🔧 {}", project.to_uppercase());
                    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
                    for var in vars {
                        println!("  {}={}", var.key, var.value);
                    }
                    println!();
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }

        "health" => match app.client.healthcheck().await {
            Ok(response) => println!("✅ Backend healthy: {}", response.message),
            Err(e) => {
                eprintln!("❌ Backend unhealthy {}", e);
                std::process::exit(1);
            }
        },

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    if config.log.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

async fn login(app: &App) -> Result<()> {
    let state = app.session.initialize().await;
    if state.is_authenticated() {
        println!("\n✅ {}", CallbackOutcome::AlreadyAuthenticated);
        print_status(&state);
        return Ok(());
    }

    println!("\n🔐 Admin OAuth");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let request = AuthorizeRequest::new(&app.config.oauth)?;
    let listener = CallbackListener::bind(
        &app.config.oauth.callback_bind,
        app.session.clone(),
        app.callback(request.state.clone()),
    )
    .await?;

    println!("\n📱 Opening browser...\n");
    println!("   {}\n", request.url);
    println!("Waiting for the redirect on http://{}/oauth", listener.local_addr()?);

    // Try to open browser
    let _ = opener::open(request.url.as_str());

    let outcome = listener.wait(Duration::from_secs(300)).await?;
    match outcome {
        CallbackOutcome::LoggedIn => {
            print!("\n⏳ Validating session...");
            std::io::stdout().flush()?;
            let state = app.session.settled().await;
            println!(" ✓\n");
            print_status(&state);
            if !state.is_authenticated() {
                std::process::exit(1);
            }
        }
        CallbackOutcome::AlreadyAuthenticated => println!("\n✅ {}\n", outcome),
        other => {
            eprintln!("\n❌ {}", other);
            if let CallbackOutcome::ServerError(error) = &other {
                eprintln!("   {}", error);
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn require_session(app: &App) {
    let state = app.session.initialize().await;
    if !state.is_authenticated() {
        eprintln!("❌ Not authenticated. Run `maintdash login` first.");
        if let Some(error) = state.last_error() {
            eprintln!("   Last validation error {}", error);
        }
        std::process::exit(1);
    }
}

fn print_status(state: &AuthState) {
    println!("\n🔐 Session Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    match state.username() {
        Some(username) if state.is_authenticated() => {
            println!("✅ Welcome {}!", username);
            if let Some(validated_at) = state.validated_at() {
                println!("   Validated: {}", validated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        _ => {
            println!("❌ Not authenticated.");
            if let Some(error) = state.last_error() {
                println!("   Last validation error {}", error);
            }
            if state.token().is_some() {
                println!("   A session token is still stored and will be retried next time");
            }
        }
    }
    println!();
}
