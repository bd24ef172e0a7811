//! Property tests for stream sessions.
//!
//! Invariants tested:
//! - Lines without terminators arrive exactly as sent, in order
//! - Length-delimited frames carry arbitrary bytes unchanged

use proptest::prelude::*;
use redial::stream::{IoTransport, LengthDelimitedCodec};
use redial::{StreamSession, TaskGroup};
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: unmarshal(marshal(x)) == x for newline-free text
    #[test]
    fn lines_arrive_as_sent(messages in prop::collection::vec("[^\r\n]{0,64}", 1..16)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let (left, right) = tokio::io::duplex(256);
            let group = TaskGroup::new();
            let spawn = |io| {
                StreamSession::<String, String>::builder()
                    .transport(IoTransport::new(io))
                    .marshal(|msg: &String| Ok(msg.clone().into()))
                    .unmarshal(|frame| Ok(String::from_utf8(frame.to_vec())?))
                    .spawn(&group)
                    .unwrap()
            };
            let sender = spawn(left);
            let receiver = spawn(right);

            for msg in &messages {
                sender.send(msg.clone()).await.unwrap();
                prop_assert_eq!(&receiver.next().await.unwrap(), msg);
            }

            group.shutdown(Duration::from_secs(2)).await.unwrap();
            Ok(())
        })?;
    }

    /// Property: length-delimited frames are binary-safe
    #[test]
    fn frames_are_binary_safe(payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let (left, right) = tokio::io::duplex(1024);
            let group = TaskGroup::new();
            let spawn = |io| {
                StreamSession::<Vec<u8>, Vec<u8>>::builder()
                    .transport(IoTransport::new(io))
                    .framing(LengthDelimitedCodec::new())
                    .marshal(|msg: &Vec<u8>| Ok(msg.clone().into()))
                    .unmarshal(|frame| Ok(frame.to_vec()))
                    .spawn(&group)
                    .unwrap()
            };
            let sender = spawn(left);
            let receiver = spawn(right);

            sender.send(payload.clone()).await.unwrap();
            prop_assert_eq!(receiver.next().await.unwrap(), payload);

            group.shutdown(Duration::from_secs(2)).await.unwrap();
            Ok(())
        })?;
    }
}
