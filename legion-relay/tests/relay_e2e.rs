//! End-to-end scenarios over real WebSocket connections.

use legion_devkit::{PayloadBuilder, TestHarness};
use legion_relay::{ChannelKind, Payload};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

#[tokio::test]
async fn video_late_joiner_scenario() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Video, "robot-a").await?;

    let f1 = PayloadBuilder::jpeg_frame(1);
    robot.send_binary(f1.clone()).await?;
    harness
        .wait_for(|| harness.relay.hubs(ChannelKind::Video).snapshot("robot-a").map(|s| s.1) == Some(1))
        .await?;

    let mut client = harness.connect_client(ChannelKind::Video, "robot-a").await?;
    assert_eq!(client.expect(WAIT).await?, Payload::Binary(f1));

    let f2 = PayloadBuilder::jpeg_frame(2);
    robot.send_binary(f2.clone()).await?;
    assert_eq!(client.expect(WAIT).await?, Payload::Binary(f2));

    client.close().await?;
    harness
        .wait_for(|| harness.relay.counts(ChannelKind::Video, "robot-a").consumers == 0)
        .await?;

    let f3 = PayloadBuilder::jpeg_frame(3);
    robot.send_binary(f3.clone()).await?;
    harness
        .wait_for(|| harness.relay.hubs(ChannelKind::Video).snapshot("robot-a").map(|s| s.1) == Some(3))
        .await?;

    let mut next = harness.connect_client(ChannelKind::Video, "robot-a").await?;
    assert_eq!(next.expect(WAIT).await?, Payload::Binary(f3));
    Ok(())
}

#[tokio::test]
async fn video_text_frames_are_not_stream_data() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Video, "r1").await?;
    let mut client = harness.connect_client(ChannelKind::Video, "r1").await?;

    robot.send_text("keepalive").await?;
    client.expect_silence(QUIET).await?;
    assert_eq!(harness.relay.hubs(ChannelKind::Video).snapshot("r1"), None);

    let frame = PayloadBuilder::jpeg_frame(9);
    robot.send_binary(frame.clone()).await?;
    assert_eq!(client.expect(WAIT).await?, Payload::Binary(frame));
    Ok(())
}

#[tokio::test]
async fn fan_out_reaches_every_client_in_order() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Thermal, "r1").await?;
    let mut a = harness.connect_client(ChannelKind::Thermal, "r1").await?;
    let mut b = harness.connect_client(ChannelKind::Thermal, "r1").await?;

    for tag in 1..=5 {
        robot.send_binary(PayloadBuilder::jpeg_frame(tag)).await?;
    }
    for client in [&mut a, &mut b] {
        for tag in 1..=5 {
            assert_eq!(client.expect(WAIT).await?, Payload::Binary(PayloadBuilder::jpeg_frame(tag)));
        }
    }
    Ok(())
}

#[tokio::test]
async fn disconnected_client_does_not_disturb_others() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Telemetry, "r1").await?;
    let gone = harness.connect_client(ChannelKind::Telemetry, "r1").await?;
    let mut stays = harness.connect_client(ChannelKind::Telemetry, "r1").await?;

    gone.close().await?;
    let reading = PayloadBuilder::telemetry(80, 41.5);
    robot.send_text(reading.clone()).await?;
    assert_eq!(stays.expect(WAIT).await?, Payload::Text(reading));
    harness
        .wait_for(|| harness.relay.counts(ChannelKind::Telemetry, "r1").consumers == 1)
        .await?;
    Ok(())
}

#[tokio::test]
async fn closing_peers_get_a_clean_handshake() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Video, "r1").await?;
    let mut client = harness.connect_client(ChannelKind::Video, "r1").await?;

    for tag in 1..=3 {
        robot.send_binary(PayloadBuilder::jpeg_frame(tag)).await?;
    }
    assert_eq!(client.expect(WAIT).await?, Payload::Binary(PayloadBuilder::jpeg_frame(1)));

    client.close().await?;
    robot.close().await?;
    harness
        .wait_for(|| {
            let counts = harness.relay.counts(ChannelKind::Video, "r1");
            counts.producers == 0 && counts.consumers == 0
        })
        .await?;
    Ok(())
}

#[tokio::test]
async fn telemetry_has_no_replay() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Telemetry, "r1").await?;
    robot.send_text(PayloadBuilder::telemetry(50, 30.0)).await?;
    harness.wait_for(|| harness.relay.presence().get("r1").is_some()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = harness.connect_client(ChannelKind::Telemetry, "r1").await?;
    client.expect_silence(QUIET).await?;
    Ok(())
}

#[tokio::test]
async fn command_round_trip_and_acks() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut robot = harness.connect_robot(ChannelKind::Command, "r1").await?;
    let mut pilot = harness.connect_client(ChannelKind::Command, "r1").await?;
    let mut watcher = harness.connect_client(ChannelKind::Command, "r1").await?;

    let stop = PayloadBuilder::command("STOP");
    pilot.send_text(stop.clone()).await?;
    assert_eq!(robot.expect(WAIT).await?, Payload::Text(stop));
    // la commande va au robot seulement
    watcher.expect_silence(QUIET).await?;

    let ack = PayloadBuilder::ack("STOP", true);
    robot.send_text(ack.clone()).await?;
    assert_eq!(pilot.expect(WAIT).await?, Payload::Text(ack.clone()));
    assert_eq!(watcher.expect(WAIT).await?, Payload::Text(ack));
    Ok(())
}

#[tokio::test]
async fn command_newest_robot_connection_wins() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut old = harness.connect_robot(ChannelKind::Command, "r1").await?;
    let mut new = harness.connect_robot(ChannelKind::Command, "r1").await?;
    let mut pilot = harness.connect_client(ChannelKind::Command, "r1").await?;

    let fwd = PayloadBuilder::command("FORWARD");
    pilot.send_text(fwd.clone()).await?;
    assert_eq!(new.expect(WAIT).await?, Payload::Text(fwd));
    old.expect_silence(QUIET).await?;

    // l'ancienne connexion qui se ferme ne retire pas la nouvelle
    old.close().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let left = PayloadBuilder::command("LEFT");
    pilot.send_text(left.clone()).await?;
    assert_eq!(new.expect(WAIT).await?, Payload::Text(left));
    Ok(())
}

#[tokio::test]
async fn command_without_robot_is_dropped() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let mut pilot = harness.connect_client(ChannelKind::Command, "ghost").await?;
    pilot.send_text(PayloadBuilder::command("STOP")).await?;
    pilot.expect_silence(QUIET).await?;

    // le robot qui arrive ensuite ne reçoit rien d'ancien
    let mut robot = harness.connect_robot(ChannelKind::Command, "ghost").await?;
    robot.expect_silence(QUIET).await?;
    Ok(())
}

#[tokio::test]
async fn robot_traffic_marks_presence() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let _robot = harness.connect_robot(ChannelKind::Video, "seen-by-ws").await?;

    let (status, body) = harness.get_json("/api/robots?online=1").await?;
    assert_eq!(status, 200);
    let robots = body["robots"].as_array().cloned().unwrap_or_default();
    assert!(robots.iter().any(|r| r["uuid"] == "seen-by-ws" && r["online"] == true));
    Ok(())
}

#[tokio::test]
async fn unknown_channel_is_rejected() -> anyhow::Result<()> {
    let harness = TestHarness::start().await?;
    let url = format!("ws://{}/ws/audio/client/r1", harness.addr);
    assert!(legion_devkit::WsPeer::connect(&url).await.is_err());
    Ok(())
}
