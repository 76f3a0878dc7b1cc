use std::thread;
use std::time::Duration;

use kbs_core::client::{channel, ClientRequest};
use kbs_core::{CancelToken, Client, ClientError, Prompt, Question, ScriptedClient};

const POLL: Duration = Duration::from_millis(5);

fn question(text: &str, deadline: Option<Duration>) -> Question {
    Question {
        prompt: Prompt::text(text),
        options: vec!["yes".into(), "no".into()],
        deadline,
    }
}

#[test]
fn endpoint_serves_a_scripted_client() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());
    let scripted = ScriptedClient::keyed([("fly", "no"), ("swim", "yes")]);
    let transcript = scripted.transcript();
    let host = thread::spawn(move || endpoint.serve(scripted));

    client.write(&Prompt::text("hello")).unwrap();
    assert_eq!(client.query(&question("Can it fly?", None)).unwrap(), "no");
    assert_eq!(client.query(&question("Can it swim?", None)).unwrap(), "yes");
    drop(client);

    host.join().unwrap().unwrap();
    assert_eq!(transcript.writes(), vec!["hello"]);
    assert_eq!(transcript.questions().len(), 2);
}

#[test]
fn unanswered_query_times_out() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());

    let err = client
        .query(&question("Anyone?", Some(Duration::from_millis(30))))
        .unwrap_err();

    assert_eq!(err, ClientError::TimedOut);
    assert!(matches!(
        endpoint.try_recv(),
        Ok(Some(ClientRequest::Query { id: 1, .. }))
    ));
}

#[test]
fn late_answer_is_not_taken_for_the_next_one() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());
    let host = thread::spawn(move || {
        let Some(ClientRequest::Query { id: first, .. }) = endpoint.recv() else {
            panic!("expected the first query");
        };
        thread::sleep(Duration::from_millis(80));
        endpoint.answer(first, "yes").unwrap();

        let Some(ClientRequest::Query { id: second, .. }) = endpoint.recv() else {
            panic!("expected the second query");
        };
        endpoint.answer(second, "no").unwrap();
        (first, second)
    });

    let err = client
        .query(&question("First?", Some(Duration::from_millis(20))))
        .unwrap_err();
    assert_eq!(err, ClientError::TimedOut);
    assert_eq!(client.query(&question("Second?", None)).unwrap(), "no");

    assert_eq!(host.join().unwrap(), (1, 2));
}

#[test]
fn cancellation_releases_a_blocked_query() {
    let cancel = CancelToken::new();
    let (mut client, _endpoint) = channel(1, POLL, cancel.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
    });

    let err = client.query(&question("Waiting?", None)).unwrap_err();
    assert_eq!(err, ClientError::Cancelled);
    canceller.join().unwrap();
}

#[test]
fn dropped_endpoint_disconnects() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());
    drop(endpoint);

    assert_eq!(client.write(&Prompt::text("hello")), Err(ClientError::Disconnected));
    assert_eq!(
        client.query(&question("Still there?", None)),
        Err(ClientError::Disconnected)
    );
}

#[test]
fn failing_host_client_hangs_up() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());
    let host =
        thread::spawn(move || endpoint.serve(ScriptedClient::sequence(Vec::<String>::new())));

    assert_eq!(
        client.query(&question("Anyone?", None)),
        Err(ClientError::Disconnected)
    );
    assert!(matches!(host.join().unwrap(), Err(ClientError::Failed(_))));
}

#[test]
fn deadline_covers_a_full_request_queue() {
    let (mut client, endpoint) = channel(1, POLL, CancelToken::new());
    // Nobody reads the endpoint, so the write fills the only slot.
    client.write(&Prompt::text("note")).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let asker = thread::spawn(move || {
        let outcome = client.query(&question("Anyone?", Some(Duration::from_millis(50))));
        let _ = tx.send(outcome);
    });

    let outcome = rx.recv_timeout(Duration::from_secs(2));
    assert_eq!(outcome, Ok(Err(ClientError::TimedOut)));
    asker.join().unwrap();

    // Only the write ever made it into the queue.
    assert!(matches!(
        endpoint.try_recv(),
        Ok(Some(ClientRequest::Write { .. }))
    ));
    assert_eq!(endpoint.try_recv(), Err(ClientError::Disconnected));
}
