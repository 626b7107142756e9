use crate::export::to_export_string;
use crate::{
    Animation, BlendMode, Bone, BoneTimelines, Curve, EventDefinition, RotateFrame,
    SkeletonDocument, SkeletonHeader, Slot,
};
use std::collections::BTreeMap;

fn sample_document() -> SkeletonDocument {
    let mut animations = BTreeMap::new();
    let mut bones_timelines = BTreeMap::new();
    bones_timelines.insert(
        "arm".to_string(),
        BoneTimelines {
            rotate: vec![
                RotateFrame {
                    time: 0.0,
                    angle: 0.0,
                    curve: Curve::Stepped,
                },
                RotateFrame {
                    time: 0.5,
                    angle: 45.0,
                    curve: Curve::Linear,
                },
            ],
            ..BoneTimelines::default()
        },
    );
    animations.insert(
        "wave".to_string(),
        Animation {
            bones: bones_timelines,
            ..Animation::default()
        },
    );

    let mut events = BTreeMap::new();
    events.insert(
        "step".to_string(),
        EventDefinition {
            int_value: 2,
            float_value: 0.0,
            string_value: None,
        },
    );

    SkeletonDocument {
        skeleton: SkeletonHeader {
            hash: "abc".to_string(),
            version: "3.1.05".to_string(),
            width: 100.0,
            height: 200.0,
            images: None,
        },
        bones: vec![
            Bone {
                name: "root".to_string(),
                ..Bone::default()
            },
            Bone {
                name: "arm".to_string(),
                parent: Some("root".to_string()),
                ..Bone::default()
            },
        ],
        ik: Vec::new(),
        slots: vec![Slot {
            name: "glow".to_string(),
            bone: "root".to_string(),
            color: "ffffffff".to_string(),
            attachment: None,
            blend: BlendMode::Additive,
        }],
        skins: BTreeMap::new(),
        events,
        animations,
    }
}

#[test]
fn export_renders_contract_field_names() {
    let text = to_export_string(&sample_document()).expect("export");
    let v: serde_json::Value = serde_json::from_str(&text).expect("export parses back");

    assert_eq!(v["skeleton"]["spine"], "3.1.05");
    assert!(v["bones"][0].get("parent").is_none());
    assert_eq!(v["bones"][1]["parent"], "root");
    assert_eq!(v["slots"][0]["blend"], "additive");
    assert_eq!(v["events"]["step"]["int"], 2);
    assert!(v["events"]["step"].get("float").is_none());

    let rotate = &v["animations"]["wave"]["bones"]["arm"]["rotate"];
    assert_eq!(rotate[0]["curve"], "stepped");
    assert!(
        rotate[1].get("curve").is_none(),
        "final frame carries no curve"
    );
}

#[test]
fn export_is_formatted_text() {
    let text = to_export_string(&sample_document()).expect("export");
    assert!(text.contains('\n'), "pretty-printed output");
}
