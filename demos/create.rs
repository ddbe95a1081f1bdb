use std::error::Error;

use assisfy_sdk::{
    AssisfyClient, AutoTrigger, ConnectStrategy, CreateSessionInput, ResourceType, SessionEvent,
};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = "REPLACE_WITH_API_KEY".to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = AssisfyClient::new(SecretString::new(api_key))?;
        let session = client.session();
        let mut events = session.events();

        // Set start_now to false to only register the schedule.
        let trigger = AutoTrigger::new(
            5,
            "2030-01-29T00:00:00Z",
            "http://localhost:4001/example-webhook",
        )
        .start_now(true);
        let input = CreateSessionInput::new("Who is the president of the United States?")
            .with_auto_trigger(trigger)
            .reject_end_at_before(chrono::Utc::now())
            .with_connect_strategy(ConnectStrategy::Duplex);
        session.create(input).await?;

        while let Some(event) = events.recv().await {
            match &event {
                SessionEvent::Message(message) => {
                    println!("message event={} data={}", message.event, message.data);
                    match message.resource_request() {
                        Some(ResourceType::AdminPermissionRequest) => {
                            session.handle_permission_request(true)
                        }
                        Some(ResourceType::RequestUserInput) => session.handle_input("test"),
                        None => {}
                    }
                    if message.is_complete() {
                        println!("cost_summary={}", message.data["cost_summary"]);
                    }
                }
                SessionEvent::Disconnected { code, reason, .. } => {
                    println!("session_disconnected code={code} reason={reason}");
                    break;
                }
                other => println!("{} {other:?}", other.name()),
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
