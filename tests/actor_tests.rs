//! Actors exchanging events through a shared directory.

use hsm_actors::core::Event;
use hsm_actors::{
    event_enum, state_enum, Actor, ActorDirectory, ActorError, FsmBuilder, Mailbox,
    StateMachineDefinition,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TIMEOUT: Duration = Duration::from_secs(60);

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,hsm_actors=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

event_enum! {
    enum Msg {
        Inquiry,
        Request,
        Response,
        Count,
    }
}

state_enum! {
    enum ClientState {
        Root,
        Idle,
        WaitingForResponse,
        Finished,
    }
}

state_enum! {
    enum ServerState {
        Root,
        Serving,
    }
}

type Directory = Arc<ActorDirectory<Msg>>;

struct Client {
    name: String,
    server: String,
    directory: Directory,
    requests: u32,
    answers: u32,
}

struct Server {
    directory: Directory,
    requests: u64,
}

fn client_definition() -> StateMachineDefinition<Client, ClientState, Msg> {
    let mut builder = FsmBuilder::of(ClientState::Root);
    builder.root().add(ClientState::Idle).initial();
    builder.root().add(ClientState::WaitingForResponse);
    builder.root().add(ClientState::Finished).final_state();
    builder
        .in_state(ClientState::Idle)
        .on(Msg::Inquiry)
        .to(ClientState::WaitingForResponse)
        .execute(|client: &mut Client, _| {
            client.requests += 1;
            let request = Event::of(Msg::Request).with_param(client.name.clone());
            client.directory.send_event_to(request, &client.server)?;
            Ok(())
        });
    builder
        .in_state(ClientState::WaitingForResponse)
        .on(Msg::Response)
        .to(ClientState::Finished)
        .execute(|client: &mut Client, _| {
            client.answers += 1;
            Ok(())
        });
    builder.build().unwrap()
}

fn server_definition() -> StateMachineDefinition<Server, ServerState, Msg> {
    let mut builder = FsmBuilder::of(ServerState::Root);
    builder.root().add(ServerState::Serving).initial();
    builder
        .in_state(ServerState::Serving)
        .on_local(Msg::Request)
        .execute(|server: &mut Server, event| {
            let sender = event
                .param::<String>(0)
                .ok_or_else(|| anyhow::anyhow!("request without sender"))?;
            server.requests += 1;
            server
                .directory
                .send_event_to(Event::of(Msg::Response), sender)?;
            Ok(())
        });
    builder.build().unwrap()
}

fn spawn_server(directory: &Directory) -> Arc<Actor<Server, ServerState, Msg>> {
    let server = Server {
        directory: Arc::clone(directory),
        requests: 0,
    };
    Actor::spawn(directory, "server", server_definition().create(server).unwrap()).unwrap()
}

fn spawn_client(
    directory: &Directory,
    definition: &StateMachineDefinition<Client, ClientState, Msg>,
    name: &str,
) -> Arc<Actor<Client, ClientState, Msg>> {
    let client = Client {
        name: name.to_string(),
        server: "server".to_string(),
        directory: Arc::clone(directory),
        requests: 0,
        answers: 0,
    };
    Actor::spawn(directory, name, definition.create(client).unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_and_server_complete_a_round_trip() {
    init_tracing();
    let directory: Directory = Arc::new(ActorDirectory::new());
    let server = spawn_server(&directory);
    let client = spawn_client(&directory, &client_definition(), "client");

    client.receive(Event::of(Msg::Inquiry)).unwrap();
    directory
        .await_completion(&["client", "server"], TIMEOUT)
        .await
        .unwrap();

    assert_eq!(client.inspect(|m| m.owner().requests), 1);
    assert_eq!(client.inspect(|m| m.owner().answers), 1);
    assert_eq!(client.active_states(), vec![ClientState::Finished]);
    assert!(client.inspect(|m| m.is_final()));
    assert_eq!(server.inspect(|m| m.owner().requests), 1);
    assert_eq!(server.active_states(), vec![ServerState::Serving]);
    assert_eq!(server.failed_events(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn server_handles_ten_thousand_clients() {
    init_tracing();
    const CLIENTS: usize = 10_000;
    let directory: Directory = Arc::new(ActorDirectory::new());
    let server = spawn_server(&directory);
    let definition = client_definition();
    let clients: Vec<_> = (0..CLIENTS)
        .map(|i| spawn_client(&directory, &definition, &format!("client-{i}")))
        .collect();

    let senders: Vec<_> = clients
        .chunks(1_000)
        .map(|chunk| {
            let names: Vec<String> = chunk.iter().map(|c| c.name().to_string()).collect();
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                for name in names {
                    directory.send_event_to(Event::of(Msg::Inquiry), &name).unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }
    directory.await_all(TIMEOUT).await.unwrap();

    assert_eq!(server.inspect(|m| m.owner().requests), CLIENTS as u64);
    assert_eq!(server.processed_events(), CLIENTS as u64);
    for client in &clients {
        let (requests, answers) = client.inspect(|m| (m.owner().requests, m.owner().answers));
        assert_eq!((requests, answers), (1, 1), "client {}", client.name());
    }
}

state_enum! {
    enum Tally {
        Root,
        Counting,
    }
}

fn tally() -> StateMachineDefinition<Vec<u64>, Tally, Msg> {
    let mut builder = FsmBuilder::of(Tally::Root);
    builder.root().add(Tally::Counting).initial();
    builder
        .in_state(Tally::Counting)
        .on_local(Msg::Count)
        .execute(|seen: &mut Vec<u64>, event| {
            seen.push(event.param::<u64>(0).copied().unwrap_or_default());
            Ok(())
        });
    builder.build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_are_processed_in_arrival_order() {
    let directory = ActorDirectory::new();
    let actor = Actor::spawn(&directory, "tally", tally().create(Vec::new()).unwrap()).unwrap();

    for i in 0..1_000u64 {
        actor.receive(Event::of(Msg::Count).with_param(i)).unwrap();
    }
    actor.await_completion(TIMEOUT).await.unwrap();

    let seen = actor.inspect(|m| m.owner().clone());
    assert_eq!(seen, (0..1_000).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_senders_lose_nothing() {
    const SENDERS: u64 = 16;
    const PER_SENDER: u64 = 500;
    let directory: Directory = Arc::new(ActorDirectory::new());
    let actor = Actor::spawn(&directory, "tally", tally().create(Vec::new()).unwrap()).unwrap();

    let handles: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                for i in 0..PER_SENDER {
                    let event = Event::of(Msg::Count).with_param(sender * PER_SENDER + i);
                    directory.send_event_to(event, "tally").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    directory.await_all(TIMEOUT).await.unwrap();

    let mut seen = actor.inspect(|m| m.owner().clone());
    assert_eq!(seen.len() as u64, SENDERS * PER_SENDER);
    seen.sort_unstable();
    assert_eq!(seen, (0..SENDERS * PER_SENDER).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completion_times_out_while_busy() {
    let directory = ActorDirectory::new();
    let mut builder = FsmBuilder::<(), Tally, Msg>::of(Tally::Root);
    builder.root().add(Tally::Counting).initial();
    builder
        .in_state(Tally::Counting)
        .on_local(Msg::Count)
        .execute(|_, _| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });
    let actor = Actor::spawn(&directory, "slow", builder.build().unwrap().create(()).unwrap())
        .unwrap();

    actor.receive(Event::of(Msg::Count)).unwrap();
    let result = actor.await_completion(Duration::from_millis(10)).await;

    assert!(matches!(result, Err(ActorError::Timeout { .. })));
}
