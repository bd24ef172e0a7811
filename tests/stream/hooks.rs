use redial::stream::{IoTransport, StreamError, Transport};
use redial::{StreamSession, TaskGroup};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn counting(count: &Arc<AtomicUsize>) -> impl Fn(&dyn Transport) -> io::Result<()> + Send + Sync + 'static {
    let count = Arc::clone(count);
    move |_transport: &dyn Transport| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn write_hooks_run_around_every_message() {
    let (local, _peer) = tokio::io::duplex(4096);
    let set = Arc::new(AtomicUsize::new(0));
    let cleared = Arc::new(AtomicUsize::new(0));
    let group = TaskGroup::new();
    let session = StreamSession::<String, String>::builder()
        .transport(IoTransport::new(local))
        .marshal(|msg: &String| Ok(msg.clone().into()))
        .unmarshal(|frame| Ok(String::from_utf8(frame.to_vec())?))
        .on_set_write_deadline(counting(&set))
        .on_clear_write_deadline(counting(&cleared))
        .spawn(&group)
        .unwrap();

    for msg in ["a", "b", "c"] {
        session.send(msg.into()).await.unwrap();
    }
    session.close().await;
    group.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(set.load(Ordering::SeqCst), 3);
    assert_eq!(cleared.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failing_read_hook_stops_the_reader() {
    let (local, mut peer) = tokio::io::duplex(4096);
    let group = TaskGroup::new();
    let session = StreamSession::<String, String>::builder()
        .transport(IoTransport::new(local))
        .marshal(|msg: &String| Ok(msg.clone().into()))
        .unmarshal(|frame| Ok(String::from_utf8(frame.to_vec())?))
        .on_set_read_deadline(|_transport: &dyn Transport| {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no deadlines here"))
        })
        .spawn(&group)
        .unwrap();

    let _ = peer.write_all(b"ignored\n").await;
    assert!(session.recv().await.is_none());

    let err = session.err().unwrap();
    match err.downcast_ref::<StreamError>() {
        Some(StreamError::Io(io)) => assert_eq!(io.kind(), io::ErrorKind::Unsupported),
        other => panic!("unexpected error: {other:?}"),
    }
}
