//! End-to-end tracker scenarios.

use maidan_track::types::{
    BallDetection, CameraCalibration, DetectionFrame, FieldSizeRaw, GeometryFrame, RobotDetection,
    VisionPacket,
};
use maidan_track::{Tracker, TrackerConfig, TrackingCommand};

const MS: i64 = 1_000_000;
/// Base time keeps the first frame newer than the tracker's initial state.
const T0: i64 = 1_000_000_000;

fn geometry_packet(cameras: &[u32]) -> VisionPacket {
    VisionPacket {
        detection: None,
        geometry: Some(GeometryFrame {
            field: FieldSizeRaw {
                line_width: 10.0,
                field_length: 9000.0,
                field_width: 6000.0,
                boundary_width: 300.0,
                goal_width: 1000.0,
                goal_depth: 200.0,
                goal_wall_width: 20.0,
                center_circle_radius: 500.0,
                defense_radius: 1000.0,
                defense_stretch: 500.0,
            },
            calibrations: cameras
                .iter()
                .map(|&camera_id| CameraCalibration {
                    camera_id,
                    derived_camera_world: Some([0.0, 0.0, 3000.0]),
                    focal_length: 500.0,
                })
                .collect(),
        }),
    }
}

fn empty_detection(camera_id: u32, t: f64) -> DetectionFrame {
    DetectionFrame {
        camera_id,
        t_capture: t,
        t_sent: t,
        balls: Vec::new(),
        robots_yellow: Vec::new(),
        robots_blue: Vec::new(),
    }
}

/// Ball at the given field position (meters), encoded in vision
/// coordinates.
fn ball_packet(camera_id: u32, field_x: f32, field_y: f32) -> VisionPacket {
    let mut detection = empty_detection(camera_id, 0.0);
    detection.balls.push(BallDetection {
        x: field_y * 1000.0,
        y: -field_x * 1000.0,
    });
    VisionPacket {
        detection: Some(detection),
        geometry: None,
    }
}

fn yellow_robot_packet(camera_id: u32, robot_id: u32, field_x: f32, field_y: f32) -> VisionPacket {
    let mut detection = empty_detection(camera_id, 0.0);
    detection.robots_yellow.push(RobotDetection {
        robot_id,
        x: field_y * 1000.0,
        y: -field_x * 1000.0,
        orientation: 0.0,
    });
    VisionPacket {
        detection: Some(detection),
        geometry: None,
    }
}

fn tracker_with_camera() -> Tracker {
    let mut tracker = Tracker::new(TrackerConfig::default());
    tracker.queue_packet(geometry_packet(&[0, 1]), T0);
    tracker
}

#[test]
fn moving_ball_position_and_speed() {
    let mut tracker = tracker_with_camera();
    // ball moving 0.625 m/s along x, frames every 16 ms
    for i in 0..=10i64 {
        tracker.queue_packet(ball_packet(0, 0.01 * i as f32, 0.0), T0 + 16 * MS * i);
    }
    tracker.process(T0 + 161 * MS);

    let snapshot = tracker.world_state(T0 + 160 * MS);
    let ball = snapshot.ball.expect("ball must be tracked");
    assert!(
        (ball.pos.x - 0.10).abs() < 0.01 && ball.pos.y.abs() < 0.01,
        "pos {:?}",
        ball.pos
    );
    assert!(
        (ball.speed.x - 0.625).abs() < 0.1 && ball.speed.y.abs() < 0.1,
        "speed {:?}",
        ball.speed
    );
}

#[test]
fn robot_association_and_peer_decay() {
    let mut tracker = tracker_with_camera();
    // establish a filter at the origin
    for i in 0..8i64 {
        tracker.queue_packet(yellow_robot_packet(0, 3, 0.0, 0.0), T0 + 16 * MS * i);
    }
    // an implausible jump opens a second hypothesis for the same id
    tracker.queue_packet(yellow_robot_packet(0, 3, 1.0, 0.0), T0 + 16 * MS * 8);
    tracker.process(T0 + 16 * MS * 9);

    // detections near the first filter keep being associated with it; the
    // jump hypothesis receives nothing and decays after its 0.2 s peer
    // timeout
    let mut last = 0;
    for i in 9..30i64 {
        tracker.queue_packet(yellow_robot_packet(0, 3, 0.05, 0.0), T0 + 16 * MS * i);
        last = T0 + 16 * MS * (i + 1);
        tracker.process(last);
    }
    let snapshot = tracker.world_state(last);
    assert_eq!(snapshot.yellow.len(), 1);
    assert!(
        snapshot.yellow[0].pos.x < 0.5,
        "surviving filter should be the associated one, got {:?}",
        snapshot.yellow[0].pos
    );
}

#[test]
fn out_of_order_frame_is_dropped() {
    let mut tracker = tracker_with_camera();
    for i in 0..=5i64 {
        tracker.queue_packet(ball_packet(0, 0.01 * i as f32, 0.0), T0 + 16 * MS * i);
    }
    tracker.process(T0 + 100 * MS);
    let before = tracker.world_state(T0 + 100 * MS);

    // a frame older than the tracked state must not change anything
    tracker.queue_packet(ball_packet(0, 5.0, 5.0), T0 + 16 * MS * 2);
    tracker.process(T0 + 101 * MS);
    let after = tracker.world_state(T0 + 100 * MS);

    let b0 = before.ball.unwrap();
    let b1 = after.ball.unwrap();
    assert_eq!(b0.pos, b1.pos);
    assert_eq!(b0.speed, b1.speed);
}

#[test]
fn stationary_object_noise_rejection() {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    let mut tracker = tracker_with_camera();
    let mut rng = StdRng::seed_from_u64(99);
    let noise = Normal::new(0.0f32, 0.005).unwrap();

    let truth = (1.0f32, 0.5f32);
    let mut errors = Vec::new();
    for i in 0..60i64 {
        let x = truth.0 + noise.sample(&mut rng);
        let y = truth.1 + noise.sample(&mut rng);
        let t = T0 + 16 * MS * i;
        tracker.queue_packet(ball_packet(0, x, y), t);
        tracker.process(t + MS);
        if i >= 20 {
            let snapshot = tracker.world_state(t);
            let ball = snapshot.ball.unwrap();
            let dx = ball.pos.x - truth.0;
            let dy = ball.pos.y - truth.1;
            errors.push(dx * dx + dy * dy);
        }
    }
    let rms = (errors.iter().sum::<f32>() / errors.len() as f32).sqrt();
    assert!(rms <= 0.003, "rms error {} m", rms);
}

#[test]
fn reset_repopulates_quickly() {
    let mut tracker = tracker_with_camera();
    for i in 0..=10i64 {
        tracker.queue_packet(yellow_robot_packet(0, 1, 0.5, 0.5), T0 + 16 * MS * i);
    }
    tracker.process(T0 + 200 * MS);
    assert_eq!(tracker.world_state(T0 + 200 * MS).yellow.len(), 1);

    tracker.handle_command(&TrackingCommand {
        reset: true,
        ..Default::default()
    });
    assert!(tracker.world_state(T0 + 200 * MS).yellow.is_empty());

    // camera calibration survives in the tracker, but one fresh frame must
    // be enough to show the robot again within the reset window
    let t1 = T0 + 300 * MS;
    tracker.queue_packet(geometry_packet(&[0, 1]), t1);
    tracker.queue_packet(yellow_robot_packet(0, 1, 0.5, 0.5), t1 + MS);
    tracker.process(t1 + 2 * MS);
    let snapshot = tracker.world_state(t1 + 2 * MS);
    assert_eq!(snapshot.yellow.len(), 1, "reset window must accept fresh filters");
}

#[test]
fn camera_handoff_keeps_ball() {
    let mut tracker = tracker_with_camera();
    // ball rolls from camera 0's area into camera 1's
    for i in 0..=10i64 {
        tracker.queue_packet(ball_packet(0, 0.05 * i as f32, 0.0), T0 + 16 * MS * i);
    }
    for i in 11..=20i64 {
        tracker.queue_packet(ball_packet(1, 0.05 * i as f32, 0.0), T0 + 16 * MS * i);
    }
    let end = T0 + 16 * MS * 20;
    tracker.process(end + MS);
    let snapshot = tracker.world_state(end);
    let ball = snapshot.ball.expect("ball must survive the hand-off");
    assert!((ball.pos.x - 1.0).abs() < 0.05, "pos {:?}", ball.pos);
}

#[test]
fn unknown_camera_detections_are_dropped() {
    let mut tracker = tracker_with_camera();
    tracker.queue_packet(ball_packet(7, 0.0, 0.0), T0 + 16 * MS);
    tracker.process(T0 + 32 * MS);
    assert!(tracker.world_state(T0 + 32 * MS).ball.is_none());
}

#[test]
fn aoi_gates_detections() {
    let mut tracker = tracker_with_camera();
    tracker.handle_command(&TrackingCommand {
        aoi_enabled: Some(true),
        aoi: Some(maidan_track::Aoi {
            x1: -1.0,
            y1: -1.0,
            x2: 1.0,
            y2: 1.0,
        }),
        ..Default::default()
    });
    // inside the AOI: tracked
    tracker.queue_packet(ball_packet(0, 0.5, 0.5), T0 + 16 * MS);
    tracker.process(T0 + 17 * MS);
    assert!(tracker.world_state(T0 + 17 * MS).ball.is_some());

    // outside the AOI: ignored; the existing filter decays
    let mut tracker2 = tracker_with_camera();
    tracker2.handle_command(&TrackingCommand {
        aoi_enabled: Some(true),
        aoi: Some(maidan_track::Aoi {
            x1: -1.0,
            y1: -1.0,
            x2: 1.0,
            y2: 1.0,
        }),
        ..Default::default()
    });
    tracker2.queue_packet(ball_packet(0, 2.0, 2.0), T0 + 16 * MS);
    tracker2.process(T0 + 17 * MS);
    assert!(tracker2.world_state(T0 + 17 * MS).ball.is_none());
}

#[test]
fn channel_ingress_matches_direct_queueing() {
    let mut tracker = tracker_with_camera();
    let sender = tracker.packet_sender();
    sender
        .send((ball_packet(0, 0.25, 0.0), T0 + 16 * MS))
        .unwrap();
    tracker.process(T0 + 17 * MS);
    let snapshot = tracker.world_state(T0 + 17 * MS);
    let ball = snapshot.ball.expect("channel packets must be processed");
    assert!((ball.pos.x - 0.25).abs() < 0.01);
}
