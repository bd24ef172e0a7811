//! Stream session metrics regression tests

use super::helpers::*;
use redial::stream::IoTransport;
use redial::{StreamSession, TaskGroup};
use serial_test::serial;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::test]
#[serial]
async fn stream_message_metrics_exist() {
    init_recorder();

    let (local, peer) = tokio::io::duplex(1024);
    let group = TaskGroup::new();
    let session = StreamSession::<String, String>::builder()
        .name("metrics_stream")
        .transport(IoTransport::new(local))
        .marshal(|msg: &String| Ok(msg.clone().into()))
        .unmarshal(|frame| Ok(String::from_utf8(frame.to_vec())?))
        .spawn(&group)
        .unwrap();

    let (peer_read, mut peer_write) = tokio::io::split(peer);
    session.send("out".into()).await.unwrap();
    let mut lines = BufReader::new(peer_read).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("out"));

    peer_write.write_all(b"in\n").await.unwrap();
    assert_eq!(session.next().await.unwrap(), "in");

    assert_counter_exists("redial_stream_messages_total");
    assert_metric_has_label("redial_stream_messages_total", "session", "metrics_stream");
    assert_metric_has_label("redial_stream_messages_total", "direction", "in");
    assert_metric_has_label("redial_stream_messages_total", "direction", "out");
}
