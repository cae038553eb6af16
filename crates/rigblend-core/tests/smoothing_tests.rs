use rigblend_core::{
    BlockData, BoneTransform, ChannelData, ClipData, Config, CoreEvent, CycleType, Engine,
    KeyInterp, SamplerId, Vec3Key,
};

const DT: f32 = 0.016;

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// Smoothing on, but no pose contributor.
fn cfg_smooth() -> Config {
    Config {
        pose_samplers: false,
        ..Config::default()
    }
}

fn const_clip(name: &str, target: &str, x: f32) -> ClipData {
    ClipData {
        name: name.to_string(),
        blocks: vec![BlockData {
            target: target.to_string(),
            channels: ChannelData {
                translation: vec![
                    Vec3Key {
                        time: 0.0,
                        value: [x, 0.0, 0.0],
                    },
                    Vec3Key {
                        time: 1.0,
                        value: [x, 0.0, 0.0],
                    },
                ],
                rotation: vec![],
                scale: vec![],
                interp: KeyInterp::Linear,
            },
            priority: None,
        }],
        duration: 1.0,
        cycle: CycleType::Loop,
        frequency: 1.0,
        additive_reference_time: None,
    }
}

fn x_of(engine: &Engine, name: &str) -> Option<f32> {
    engine
        .outputs()
        .changes
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| c.transform.translation)
        .map(|t| t[0])
}

fn detached_sampler(events: &[CoreEvent]) -> Option<SamplerId> {
    events.iter().find_map(|e| match e {
        CoreEvent::ContributorDetached { sampler, .. } => Some(*sampler),
        _ => None,
    })
}

/// it should seed the first observed weight without lag
#[test]
fn first_frame_is_not_lagged() {
    let mut engine = Engine::new(cfg_smooth());
    engine.add_target("root", BoneTransform::identity());
    let a = engine.add_clip(&const_clip("a", "root", 2.0)).unwrap();

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    engine.update(DT);
    approx(x_of(&engine, "root").unwrap(), 2.0, 1e-5);
}

/// it should fade a detached contributor out instead of popping
#[test]
fn detached_contributor_fades_then_is_removed() {
    let mut engine = Engine::new(cfg_smooth());
    engine.add_target("root", BoneTransform::identity());
    let a = engine.add_clip(&const_clip("a", "root", 1.0)).unwrap();
    let b = engine.add_clip(&const_clip("b", "root", 2.0)).unwrap();

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    engine.activate(b, 2, 1.0, 0.0, None, true).unwrap();
    for _ in 0..10 {
        engine.update(DT);
    }
    approx(x_of(&engine, "root").unwrap(), 1.5, 1e-3);

    engine.deactivate(a, 0.0).unwrap();
    let mut last = x_of(&engine, "root").unwrap();
    let mut detach_seen = false;
    for _ in 0..60 {
        let out = engine.update(DT);
        if detached_sampler(&out.events) == Some(SamplerId(0)) {
            detach_seen = true;
        }
        let x = x_of(&engine, "root").unwrap();
        assert!(x >= last - 1e-5, "x={x} regressed below {last}");
        last = x;
    }
    assert!(detach_seen, "parked contributor never removed");
    approx(last, 2.0, 1e-4);
}

/// it should reuse a parked slot when the clip is reactivated mid-fade
#[test]
fn reattach_mid_fade_reuses_the_parked_slot() {
    let mut engine = Engine::new(cfg_smooth());
    let root = engine.add_target("root", BoneTransform::identity());
    let a = engine.add_clip(&const_clip("a", "root", 1.0)).unwrap();
    let b = engine.add_clip(&const_clip("b", "root", 2.0)).unwrap();

    let mut attaches_of_a = 0;
    let mut count = |events: &[CoreEvent]| {
        attaches_of_a += events
            .iter()
            .filter(|e| {
                matches!(e, CoreEvent::ContributorAttached { sampler, .. } if *sampler == SamplerId(0))
            })
            .count();
    };

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    engine.activate(b, 2, 1.0, 0.0, None, true).unwrap();
    for _ in 0..10 {
        count(&engine.update(DT).events);
    }
    engine.deactivate(a, 0.0).unwrap();
    for _ in 0..5 {
        count(&engine.update(DT).events);
    }
    let fading = engine
        .target(root)
        .unwrap()
        .smoothing
        .find(SamplerId(0))
        .and_then(|i| engine.target(root).unwrap().smoothing.entry(i))
        .map(|e| e.smoothed_weight)
        .unwrap();
    assert!(fading > 0.0 && fading < 0.5);

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    count(&engine.update(DT).events);
    let resumed = engine
        .target(root)
        .unwrap()
        .smoothing
        .find(SamplerId(0))
        .and_then(|i| engine.target(root).unwrap().smoothing.entry(i))
        .map(|e| e.smoothed_weight)
        .unwrap();
    // The in-flight weight keeps smoothing toward 0.5; no reseed.
    assert!(resumed > fading && resumed < 0.5);
    assert_eq!(attaches_of_a, 1, "parked reattach must not re-announce");
}

/// it should blend a lone fresh clip up from the held pose
#[test]
fn pose_contributor_bridges_a_cold_start() {
    let mut engine = Engine::default();
    engine.add_target("root", BoneTransform::identity());
    let a = engine.add_clip(&const_clip("a", "root", 1.0)).unwrap();

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    engine.update(DT);
    // Clip at smoothed weight 1, pose decayed one frame from 1.
    let first = x_of(&engine, "root").unwrap();
    approx(first, 0.579, 2e-3);

    let mut last = first;
    let mut pose_removed = false;
    for _ in 0..60 {
        let out = engine.update(DT);
        if detached_sampler(&out.events) == Some(SamplerId(1)) {
            pose_removed = true;
        }
        let x = x_of(&engine, "root").unwrap();
        assert!(x >= last - 1e-5, "x={x} regressed below {last}");
        last = x;
    }
    assert!(pose_removed, "pose contributor never faded out");
    approx(last, 1.0, 1e-4);
}

/// it should remove contributors immediately when smoothing is off
#[test]
fn smoothing_disabled_detaches_immediately() {
    let mut engine = Engine::new(Config {
        blend_smoothing: false,
        pose_samplers: false,
        ..Config::default()
    });
    engine.add_target("root", BoneTransform::identity());
    let a = engine.add_clip(&const_clip("a", "root", 1.0)).unwrap();

    engine.activate(a, 2, 1.0, 0.0, None, true).unwrap();
    engine.update(DT);
    engine.deactivate(a, 0.0).unwrap();
    let out = engine.update(0.0);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, CoreEvent::ContributorDetached { sampler, .. } if *sampler == SamplerId(0))));
    assert!(out.changes.is_empty());
}
