use std::error::Error;

use assisfy_sdk::{AssisfyClient, ConnectStrategy, ResourceType, SessionEvent};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = "REPLACE_WITH_API_KEY".to_string();
    let session_id = "REPLACE_WITH_SESSION_ID";

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = AssisfyClient::new(SecretString::new(api_key))?;
        let session = client.session();
        let mut events = session.events();

        session.connect(session_id, ConnectStrategy::Duplex).await?;
        let snapshot = session.get_session_data().await?;
        println!("snapshot={snapshot}");

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connected { session_id } => {
                    println!("session_connected session_id={session_id}");
                }
                SessionEvent::Error { error, .. } => eprintln!("session_error {error}"),
                SessionEvent::Message(message) => {
                    println!("message event={} data={}", message.event, message.data);
                    match message.resource_request() {
                        Some(ResourceType::AdminPermissionRequest) => {
                            session.handle_permission_request(true)
                        }
                        Some(ResourceType::RequestUserInput) => session.handle_input("test"),
                        None => {}
                    }
                }
                SessionEvent::Disconnected { code, reason, .. } => {
                    println!("session_disconnected code={code} reason={reason}");
                    break;
                }
                SessionEvent::Created(_) => {}
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
