use std::error::Error;

use assisfy_sdk::{
    AssisfyClient, ConnectStrategy, CreateSessionInput, Environment, ResourceType, SessionEvent,
    SessionEventName,
};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = "REPLACE_WITH_API_KEY".to_string();
    let environment: Environment = std::env::var("ASSISFY_ENV")
        .unwrap_or_else(|_| "production".to_string())
        .parse()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = AssisfyClient::with_environment(SecretString::new(api_key), environment)?;
        let session = client.session();

        let responder = session.clone();
        session.on(SessionEventName::Message, move |event| {
            let Some(message) = event.as_message() else {
                return;
            };
            println!("received {} event: {}", message.event, message.data);
            match message.resource_request() {
                Some(ResourceType::AdminPermissionRequest) => {
                    responder.handle_permission_request(true)
                }
                Some(ResourceType::RequestUserInput) => responder.handle_input("test"),
                None => {}
            }
        });
        session.on(SessionEventName::Error, |event| {
            if let SessionEvent::Error { error, .. } = event {
                eprintln!("session_error {error}");
            }
        });

        let mut disconnects = session.events();
        session
            .create(
                CreateSessionInput::new("Who is the president of the United States?")
                    .with_connect_strategy(ConnectStrategy::Stream),
            )
            .await?;
        println!("session_created id={:?}", session.session_id());

        while let Some(event) = disconnects.recv().await {
            if let SessionEvent::Disconnected { code, reason, .. } = event {
                println!("session_disconnected code={code} reason={reason}");
                break;
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
