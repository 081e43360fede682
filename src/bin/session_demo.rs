/// Walks a session through its life against whichever backend the settings select.
///
/// ```text
/// ACCESS_KEY=... REFRESH_KEY=... cargo run --bin session_demo -- --settings settings/release.toml
/// ```
///
/// With `settings/dev.toml` (the default in debug builds) the in-memory store is used
/// and no external service is needed.
use futures_util::future::join_all;
use tokenpair::application_port::SessionError;
use tokenpair::logger::*;
use tokenpair::server::Server;
use tokenpair::settings::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig {
        filter: "session_demo=debug,tokenpair=debug".to_string(),
    })?;

    let server = Server::try_new(&project_settings).await?;
    let sessions = server.session_service.clone();

    // region issue and rotate

    let p0 = sessions.new_session("guid-42").await?;
    println!(
        "issued: access expires {}, refresh expires {}",
        p0.access_expires_at, p0.refresh_expires_at
    );

    let p1 = sessions.refresh_session(p0.refresh.as_str()).await?;
    println!("rotated once, new refresh expires {}", p1.refresh_expires_at);

    match sessions.refresh_session(p0.refresh.as_str()).await {
        Err(SessionError::NotFound) => println!("replaying the first refresh value -> NotFound"),
        other => println!("unexpected replay result: {:?}", other.map(|_| ())),
    }

    // endregion

    // region concurrent rotation

    let attempts = (0..8).map(|_| {
        let sessions = sessions.clone();
        let presented = p1.refresh.as_str().to_string();
        tokio::spawn(async move { sessions.refresh_session(&presented).await })
    });
    let results = join_all(attempts).await;

    let mut winners = Vec::new();
    let mut rejected = 0;
    for result in results {
        match result? {
            Ok(pair) => winners.push(pair),
            Err(SessionError::NotFound) => rejected += 1,
            Err(e) => println!("rotation attempt failed: {}", e),
        }
    }
    println!(
        "8 concurrent rotations: {} succeeded, {} rejected",
        winners.len(),
        rejected
    );

    // endregion

    // region verify and revoke

    if let Some(latest) = winners.pop() {
        let claims = sessions.verify_access(&latest.access).await?;
        println!("access token verified for {}, exp {}", claims.sub, claims.exp);

        sessions.revoke_session(latest.refresh.as_str()).await?;
        match sessions.refresh_session(latest.refresh.as_str()).await {
            Err(SessionError::NotFound) => println!("revoked value -> NotFound"),
            other => println!("unexpected result after revoke: {:?}", other.map(|_| ())),
        }
    }

    // endregion

    server.shutdown().await;
    Ok(())
}
