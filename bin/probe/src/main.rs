use std::process::ExitCode;
use std::sync::Arc;

use rootcause::prelude::{Report, ResultExt};
use tidal_bridge_capability::CapabilityResolver;
use tidal_bridge_engine::{
    EngineClient, EngineError, LiveChannel, LiveConfig, LiveFilter, ResourceView,
};
use tidal_bridge_probe::{
    StdoutNavigator,
    callback::parse_callback,
    config::{ProbeConfig, ProbeSettings},
    error::ProbeError,
    render,
    token_cache::TokenCache,
};
use tidal_bridge_session::{
    AuthorizedClient, BootState, OidcProvider, RefreshGate, RequestInterceptor, RouteAccess,
    SessionBootstrapper, TokenStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,tidal_bridge_session=debug,tidal_bridge_engine=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            error!("{report}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Report<ProbeError>> {
    let config = ProbeConfig::from_env().map_err(|e| ProbeError::Configuration {
        details: e.to_string(),
    })?;
    info!("Loaded configuration");

    let cache = config.probe.token_cache.clone().map(TokenCache::new);
    let offline_token = match &cache {
        Some(cache) => cache.load().await?,
        None => None,
    };

    let provider = Arc::new(
        OidcProvider::new(config.oidc)
            .map_err(session_error)?
            .with_offline_token(offline_token),
    );
    let store = TokenStore::new();
    let gate = RefreshGate::new(store.clone(), provider.clone(), config.refresh);
    let interceptor = Arc::new(RequestInterceptor::new(gate));
    let bootstrapper = SessionBootstrapper::new(
        provider.clone(),
        interceptor.clone(),
        Arc::new(StdoutNavigator),
    );

    match bootstrapper.start(RouteAccess::RequiresAuth).await {
        BootState::Authenticated => {}
        BootState::Anonymous => {
            let callback = read_callback().await?;
            bootstrapper
                .complete_login(&callback)
                .await
                .map_err(session_error)?;
        }
        BootState::Failed { reason } => return Err(ProbeError::Session { reason }.into()),
        BootState::Init => {
            return Err(ProbeError::Session {
                reason: "session check did not finish".to_string(),
            }
            .into());
        }
    }
    save_offline_token(cache.as_ref(), &provider).await?;

    let claims = store.claims();
    info!(subject = ?claims.subject(), "Session established");

    let http = AuthorizedClient::new(reqwest::Client::new(), interceptor);
    let client = EngineClient::new(config.engine, http).context(ProbeError::Engine)?;

    let result = probe(&bootstrapper, &client, &config.probe, config.live).await;
    save_offline_token(cache.as_ref(), &provider).await?;
    result
}

async fn probe(
    bootstrapper: &SessionBootstrapper,
    client: &EngineClient,
    settings: &ProbeSettings,
    live: LiveConfig,
) -> Result<(), Report<ProbeError>> {
    let Some(resource_type) = settings.resource_type.as_deref() else {
        println!("No resource type configured; set PROBE__RESOURCE_TYPE to fetch resources.");
        return Ok(());
    };

    let Some(id) = settings.resource_id.as_deref() else {
        let page = engine(bootstrapper, client.list(resource_type).await).await?;
        println!("{}", render::render_page(&page));
        if settings.follow {
            follow(bootstrapper, client, None, LiveFilter::for_type(resource_type), live).await?;
        }
        return Ok(());
    };

    let view = ResourceView::new(resource_type);
    engine(bootstrapper, view.load(client, id).await).await?;
    println!("{}", render::render_view(&view.state(), &bootstrapper.store().claims()));

    if let Some(action) = settings.action.as_deref() {
        invoke(bootstrapper, client, &view, action).await?;
    }

    if settings.follow {
        let filter = LiveFilter::for_instance(resource_type, id);
        follow(bootstrapper, client, Some(&view), filter, live).await?;
    }
    Ok(())
}

/// Invokes `action` on the shown instance if the server offers it.
async fn invoke(
    bootstrapper: &SessionBootstrapper,
    client: &EngineClient,
    view: &ResourceView,
    action: &str,
) -> Result<(), Report<ProbeError>> {
    let tidal_bridge_engine::ViewState::Loaded(instance) = view.state() else {
        return Err(ProbeError::ActionNotPermitted {
            resource: view.shown().unwrap_or_default(),
            action: action.to_string(),
        }
        .into());
    };

    if !CapabilityResolver::new().is_permitted_name(&instance, action) {
        return Err(ProbeError::ActionNotPermitted {
            resource: instance.id,
            action: action.to_string(),
        }
        .into());
    }

    let result = engine(
        bootstrapper,
        client
            .invoke(view.resource_type(), &instance.id, action, None)
            .await,
    )
    .await?;
    println!("{action} returned {result}");

    engine(bootstrapper, view.refresh(client).await).await?;
    println!("{}", render::render_view(&view.state(), &bootstrapper.store().claims()));
    Ok(())
}

/// Prints live updates until interrupted.
async fn follow(
    bootstrapper: &SessionBootstrapper,
    client: &EngineClient,
    view: Option<&ResourceView>,
    filter: LiveFilter,
    live: LiveConfig,
) -> Result<(), Report<ProbeError>> {
    let channel = LiveChannel::new(client, live).context(ProbeError::Engine)?;
    let mut subscription = channel.subscribe(filter);
    info!(url = %channel.url(), "Following live updates; press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    warn!("Live updates stopped");
                    return Ok(());
                };
                debug!(id = %event.id, kind = ?event.kind, "Live update");
                match view {
                    Some(view) => {
                        if view.on_event(client, &event).await {
                            let claims = bootstrapper.store().claims();
                            println!("{}", render::render_view(&view.state(), &claims));
                        }
                    }
                    None => println!("{} {} {:?}", event.resource_type, event.id, event.kind),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                return Ok(());
            }
        }
    }
}

/// Lets the bootstrapper react to an expired session, then wraps the error.
async fn engine<T>(
    bootstrapper: &SessionBootstrapper,
    result: Result<T, Report<EngineError>>,
) -> Result<T, Report<ProbeError>> {
    if let Err(report) = &result {
        if bootstrapper.handle_auth_failure(report).await {
            warn!("Session expired; log in again and rerun the probe");
        }
    }
    result.context(ProbeError::Engine)
}

async fn read_callback() -> Result<tidal_bridge_session::CallbackData, ProbeError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| ProbeError::InvalidCallback {
            reason: e.to_string(),
        })?
        .ok_or_else(|| ProbeError::InvalidCallback {
            reason: "no input".to_string(),
        })?;
    parse_callback(&line)
}

async fn save_offline_token(
    cache: Option<&TokenCache>,
    provider: &OidcProvider,
) -> Result<(), ProbeError> {
    match cache {
        Some(cache) => cache.store(provider.offline_token().as_deref()).await,
        None => Ok(()),
    }
}

fn session_error(e: tidal_bridge_session::AuthenticationError) -> ProbeError {
    ProbeError::Session {
        reason: e.to_string(),
    }
}
