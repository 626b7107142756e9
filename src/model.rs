//! Decoded skeleton document. Plain data: cross-entity references are held
//! by name, never by ownership, and the serialized field names match the
//! JSON variant of the schema so downstream consumers can take either.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkeletonDocument {
    pub skeleton: SkeletonHeader,
    pub bones: Vec<Bone>,
    pub ik: Vec<IkConstraint>,
    pub slots: Vec<Slot>,
    pub skins: BTreeMap<String, Skin>,
    pub events: BTreeMap<String, EventDefinition>,
    pub animations: BTreeMap<String, Animation>,
}

/// Slot name → attachment name → attachment.
pub type Skin = BTreeMap<String, BTreeMap<String, Attachment>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkeletonHeader {
    pub hash: String,
    #[serde(rename = "spine")]
    pub version: String,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bone {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "scaleX")]
    pub scale_x: f32,
    #[serde(rename = "scaleY")]
    pub scale_y: f32,
    pub rotation: f32,
    pub length: f32,
    #[serde(rename = "inheritScale", skip_serializing_if = "is_true")]
    pub inherit_scale: bool,
    #[serde(rename = "inheritRotation", skip_serializing_if = "is_true")]
    pub inherit_rotation: bool,
    #[serde(rename = "flipX", skip_serializing_if = "is_false")]
    pub flip_x: bool,
    #[serde(rename = "flipY", skip_serializing_if = "is_false")]
    pub flip_y: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Default for Bone {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            length: 0.0,
            inherit_scale: true,
            inherit_rotation: true,
            flip_x: false,
            flip_y: false,
            color: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IkConstraint {
    pub name: String,
    pub bones: Vec<String>,
    pub target: String,
    pub mix: f32,
    #[serde(rename = "bendPositive")]
    pub bend_positive: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
}

impl BlendMode {
    pub(crate) fn is_normal(&self) -> bool {
        *self == Self::Normal
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Slot {
    pub name: String,
    pub bone: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(skip_serializing_if = "BlendMode::is_normal")]
    pub blend: BlendMode,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    Region(RegionAttachment),
    BoundingBox(BoundingBoxAttachment),
    Mesh(MeshAttachment),
    SkinnedMesh(SkinnedMeshAttachment),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "scaleX")]
    pub scale_x: f32,
    #[serde(rename = "scaleY")]
    pub scale_y: f32,
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBoxAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub vertices: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    pub vertices: Vec<f32>,
    pub color: String,
    pub hull: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

/// Bone-weighted mesh. `vertices` interleaves per-vertex runs of
/// `[bone_count, bone_index, x, y, weight, ...]` like the JSON schema does.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkinnedMeshAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    pub vertices: Vec<f32>,
    pub color: String,
    pub hull: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct EventDefinition {
    #[serde(rename = "int", skip_serializing_if = "is_zero_i32")]
    pub int_value: i32,
    #[serde(rename = "float", skip_serializing_if = "is_zero_f32")]
    pub float_value: f32,
    #[serde(rename = "string", skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct Animation {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub slots: BTreeMap<String, SlotTimelines>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bones: BTreeMap<String, BoneTimelines>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ik: BTreeMap<String, Vec<IkFrame>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ffd: BTreeMap<String, FfdSkin>,
    #[serde(rename = "drawOrder", skip_serializing_if = "Vec::is_empty")]
    pub draw_order: Vec<DrawOrderFrame>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventFrame>,
}

/// Slot name → mesh name → deform frames, within one skin.
pub type FfdSkin = BTreeMap<String, BTreeMap<String, Vec<FfdFrame>>>;

#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct SlotTimelines {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub color: Vec<ColorFrame>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct BoneTimelines {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rotate: Vec<RotateFrame>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub translate: Vec<XyFrame>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scale: Vec<XyFrame>,
}

/// Interpolation toward the next frame. The final frame of a timeline is
/// always `Linear`: there is nothing to interpolate into.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

impl Curve {
    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear)
    }
}

impl Serialize for Curve {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Linear => serializer.serialize_str("linear"),
            Self::Stepped => serializer.serialize_str("stepped"),
            Self::Bezier { cx1, cy1, cx2, cy2 } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(cx1)?;
                seq.serialize_element(cy1)?;
                seq.serialize_element(cx2)?;
                seq.serialize_element(cy2)?;
                seq.end()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    #[serde(skip_serializing_if = "Curve::is_linear")]
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct XyFrame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    #[serde(skip_serializing_if = "Curve::is_linear")]
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColorFrame {
    pub time: f32,
    pub color: String,
    #[serde(skip_serializing_if = "Curve::is_linear")]
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    #[serde(rename = "bendPositive")]
    pub bend_positive: bool,
    #[serde(skip_serializing_if = "Curve::is_linear")]
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FfdFrame {
    pub time: f32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub offset: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<f32>,
    #[serde(skip_serializing_if = "Curve::is_linear")]
    pub curve: Curve,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawOrderFrame {
    pub time: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offsets: Vec<DrawOrderOffset>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawOrderOffset {
    pub slot: String,
    pub offset: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventFrame {
    pub time: f32,
    pub name: String,
    #[serde(rename = "int", skip_serializing_if = "is_zero_i32")]
    pub int_value: i32,
    #[serde(rename = "float", skip_serializing_if = "is_zero_f32")]
    pub float_value: f32,
    #[serde(rename = "string", skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}
