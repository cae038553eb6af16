use rigblend_core::{parse_stored_clip_json, BoneTransform, Config, CycleType, Engine};

const WALK: &str = r#"{
    "name": "walk",
    "duration": 2.0,
    "cycle": "clamp",
    "frequency": 1.0,
    "blocks": [
        {
            "target": "Bip01 Spine",
            "translation": [
                { "time": 0.0, "value": { "x": 0.0, "y": 0.0, "z": 0.0 } },
                { "time": 2.0, "value": { "x": 4.0, "y": 0.0, "z": 0.0 } }
            ],
            "scale": [
                { "time": 0.0, "value": 1.0 },
                { "time": 2.0, "value": 2.0 }
            ]
        }
    ]
}"#;

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// it should drive the engine with a clip parsed from JSON
#[test]
fn parsed_clip_plays_end_to_end() {
    let clip = parse_stored_clip_json(WALK).unwrap();
    assert_eq!(clip.cycle, CycleType::Clamp);

    let mut engine = Engine::new(Config {
        blend_smoothing: false,
        pose_samplers: false,
        ..Config::default()
    });
    engine.add_target("Bip01 Spine", BoneTransform::identity());
    let walk = engine.add_clip(&clip).unwrap();

    engine.activate(walk, 4, 1.0, 0.0, None, true).unwrap();
    engine.update(0.0);
    engine.update(1.0);

    let change = &engine.outputs().changes[0];
    approx(change.transform.translation.unwrap()[0], 2.0, 1e-4);
    approx(change.transform.scale.unwrap(), 1.5, 1e-4);
    // Rotation was not animated; the rest pose fills it in.
    assert_eq!(change.transform.rotation, Some([0.0, 0.0, 0.0, 1.0]));
}

/// it should hold the final frame past the end of a clamped clip
#[test]
fn clamped_clip_holds_past_the_end() {
    let clip = parse_stored_clip_json(WALK).unwrap();
    let mut engine = Engine::new(Config {
        blend_smoothing: false,
        pose_samplers: false,
        ..Config::default()
    });
    engine.add_target("Bip01 Spine", BoneTransform::identity());
    let walk = engine.add_clip(&clip).unwrap();

    engine.activate(walk, 4, 1.0, 0.0, None, true).unwrap();
    engine.update(0.0);
    engine.update(10.0);
    let change = &engine.outputs().changes[0];
    approx(change.transform.translation.unwrap()[0], 4.0, 1e-4);
}
