//! Binary `.skel` decoder.
//!
//! The decoder is IO-free: it runs one linear pass over an in-memory byte
//! slice and assembles the [`SkeletonDocument`]. Reference tables mapping
//! ordinals to names live only for the duration of a call; separate calls
//! are fully independent and may run on separate threads.

use crate::{
    Animation, Attachment, AttachmentFrame, BlendMode, Bone, BoundingBoxAttachment, ColorFrame,
    Curve, DrawOrderFrame, DrawOrderOffset, Error, EventDefinition, EventFrame, FfdFrame,
    FormatProfile, IkConstraint, IkFrame, MeshAttachment, RegionAttachment, RotateFrame, Skin,
    SkeletonDocument, SkeletonHeader, SkinnedMeshAttachment, Slot, SlotTimelines, XyFrame,
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::BTreeMap;

const CURVE_LINEAR: u8 = 0;
const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const ATTACHMENT_REGION: u8 = 0;
const ATTACHMENT_BOUNDING_BOX: u8 = 1;
const ATTACHMENT_MESH: u8 = 2;
const ATTACHMENT_SKINNED_MESH: u8 = 3;

// Bone and slot timelines share one type-tag space.
const TIMELINE_SCALE: u8 = 0;
const TIMELINE_ROTATE: u8 = 1;
const TIMELINE_TRANSLATE: u8 = 2;
const TIMELINE_ATTACHMENT: u8 = 3;
const TIMELINE_COLOR: u8 = 4;
const TIMELINE_FLIPX: u8 = 5;
const TIMELINE_FLIPY: u8 = 6;

/// String payloads longer than this are truncated instead of allocated in
/// full; the cursor still advances over the declared length.
const MAX_STRING_BYTES: usize = 200;

/// Policy for ordinals that resolve to no table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Strictness {
    /// Any out-of-range ordinal aborts the decode.
    #[default]
    Strict,
    /// Out-of-range ordinals degrade: bone references fall back to the root
    /// bone's name, slot/IK/skin/event references to an absent entry.
    Lenient,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DecodeOptions {
    pub strictness: Strictness,
}

/// Non-fatal observations made while decoding.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DecodeStats {
    /// Legacy skinned-mesh attachments removed from skins in post-processing.
    pub dropped_attachments: usize,
    /// Bytes left unread after the last section. Some producers append
    /// harmless trailing data, so this is reported rather than rejected.
    pub trailing_bytes: usize,
}

#[derive(Clone, Debug)]
struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(Error::PrematureEof {
                offset: self.cursor,
            });
        }
        let out = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    fn read_u16_be(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn read_i32_be(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    // Ints in the stream are big-endian, but floats arrive byte-reversed
    // relative to them, so they decode little-endian.
    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// 7-bit groups, low group first, 0x80 continuation, at most 5 bytes.
    /// With `optimize_positive` the raw value is returned; otherwise it is
    /// zigzag-decoded.
    fn read_varint(&mut self, optimize_positive: bool) -> Result<i32, Error> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let b = self.read_u8()?;
            value |= ((b & 0x7f) as u32) << (7 * i);
            if b & 0x80 == 0 {
                break;
            }
        }
        if optimize_positive {
            Ok(value as i32)
        } else {
            Ok((value >> 1) as i32 ^ -((value & 1) as i32))
        }
    }

    /// Count prefix, validated against the bytes left in the stream: every
    /// counted element consumes at least one byte, so a count the stream
    /// cannot back (a wrapped negative varint included) can only end in an
    /// EOF. Failing at the count keeps allocation bounded by the input size.
    fn read_count(&mut self) -> Result<usize, Error> {
        let offset = self.cursor;
        let raw = self.read_varint(true)?;
        match usize::try_from(raw) {
            Ok(count) if count <= self.remaining() => Ok(count),
            _ => Err(Error::PrematureEof { offset }),
        }
    }

    /// Length byte L, then L-1 payload bytes. L of 0 or 1 is an absent
    /// string (the empty string is not representable). Payloads beyond
    /// [`MAX_STRING_BYTES`] are truncated at a char boundary; the cursor
    /// advances over the full declared length either way.
    fn read_string(&mut self) -> Result<Option<String>, Error> {
        let offset = self.cursor;
        let length = self.read_u8()? as usize;
        if length <= 1 {
            return Ok(None);
        }
        let byte_len = length - 1;
        let bytes = self.take(byte_len)?;
        let kept = &bytes[..byte_len.min(MAX_STRING_BYTES)];
        match std::str::from_utf8(kept) {
            Ok(s) => Ok(Some(s.to_string())),
            // A char split by the clamp is trimmed; anything else is a
            // genuinely bad payload.
            Err(e) if kept.len() < bytes.len() && e.error_len().is_none() => {
                match std::str::from_utf8(&kept[..e.valid_up_to()]) {
                    Ok(s) => Ok(Some(s.to_string())),
                    Err(_) => Err(Error::InvalidUtf8 { offset }),
                }
            }
            Err(_) => Err(Error::InvalidUtf8 { offset }),
        }
    }

    /// Big-endian RGBA int rendered as an 8-digit hex string.
    fn read_color(&mut self) -> Result<String, Error> {
        let rgba = self.read_i32_be()? as u32;
        Ok(format!("{rgba:08x}"))
    }
}

/// Append-only ordinal → name arenas, one per entity kind, populated as the
/// sections decode and discarded afterwards.
#[derive(Default)]
struct RefTables {
    bones: Vec<String>,
    slots: Vec<String>,
    iks: Vec<String>,
    skins: Vec<String>,
}

impl RefTables {
    fn bone_name(
        &self,
        index: usize,
        offset: usize,
        strictness: Strictness,
    ) -> Result<String, Error> {
        if let Some(name) = self.bones.get(index) {
            return Ok(name.clone());
        }
        match (strictness, self.bones.first()) {
            (Strictness::Lenient, Some(root)) => Ok(root.clone()),
            _ => Err(Error::OutOfRangeIndex {
                table: "bone",
                index,
                len: self.bones.len(),
                offset,
            }),
        }
    }

    fn slot_name(
        &self,
        index: usize,
        offset: usize,
        strictness: Strictness,
    ) -> Result<Option<String>, Error> {
        lookup("slot", &self.slots, index, offset, strictness)
    }

    fn ik_name(
        &self,
        index: usize,
        offset: usize,
        strictness: Strictness,
    ) -> Result<Option<String>, Error> {
        lookup("ik constraint", &self.iks, index, offset, strictness)
    }

    fn skin_name(
        &self,
        index: usize,
        offset: usize,
        strictness: Strictness,
    ) -> Result<Option<String>, Error> {
        lookup("skin", &self.skins, index, offset, strictness)
    }
}

fn lookup(
    table: &'static str,
    names: &[String],
    index: usize,
    offset: usize,
    strictness: Strictness,
) -> Result<Option<String>, Error> {
    match (names.get(index), strictness) {
        (Some(name), _) => Ok(Some(name.clone())),
        (None, Strictness::Lenient) => Ok(None),
        (None, Strictness::Strict) => Err(Error::OutOfRangeIndex {
            table,
            index,
            len: names.len(),
            offset,
        }),
    }
}

fn read_header(input: &mut ByteReader<'_>) -> Result<(SkeletonHeader, FormatProfile, bool), Error> {
    let hash = input.read_string()?.unwrap_or_default();
    let version_offset = input.cursor;
    let version = input.read_string()?.unwrap_or_default();
    let profile = FormatProfile::from_version(&version, version_offset)?;
    let width = input.read_f32()?;
    let height = input.read_f32()?;
    let nonessential = input.read_bool()?;
    let images = if nonessential {
        input.read_string()?
    } else {
        None
    };
    Ok((
        SkeletonHeader {
            hash,
            version,
            width,
            height,
            images,
        },
        profile,
        nonessential,
    ))
}

fn read_bones(
    input: &mut ByteReader<'_>,
    profile: FormatProfile,
    nonessential: bool,
    strictness: Strictness,
) -> Result<Vec<Bone>, Error> {
    let count = input.read_count()?;
    let mut bones = Vec::with_capacity(count);
    let mut parents = Vec::with_capacity(count);

    for _ in 0..count {
        let name = input.read_string()?.unwrap_or_default();
        let parent_offset = input.cursor;
        let parent_ordinal = input.read_varint(true)? as usize;
        parents.push((parent_ordinal, parent_offset));

        let mut bone = Bone {
            name,
            x: input.read_f32()?,
            y: input.read_f32()?,
            scale_x: input.read_f32()?,
            scale_y: input.read_f32()?,
            rotation: input.read_f32()?,
            length: input.read_f32()?,
            ..Bone::default()
        };
        match profile {
            FormatProfile::Legacy => {
                bone.flip_x = input.read_bool()?;
                bone.flip_y = input.read_bool()?;
            }
            FormatProfile::Modern => {
                // Sign bits folded into the scale.
                if input.read_bool()? {
                    bone.scale_x = -bone.scale_x;
                }
                if input.read_bool()? {
                    bone.scale_y = -bone.scale_y;
                }
            }
        }
        bone.inherit_scale = input.read_bool()?;
        bone.inherit_rotation = input.read_bool()?;
        if nonessential {
            bone.color = Some(input.read_color()?);
        }
        bones.push(bone);
    }

    // Second pass over the fully-populated table: ordinal 0 means no parent,
    // otherwise ordinal-1 indexes a bone defined strictly earlier.
    let root_name = bones.first().map(|b| b.name.clone());
    for i in 0..bones.len() {
        let (ordinal, offset) = parents[i];
        if ordinal == 0 {
            continue;
        }
        let index = ordinal - 1;
        if index < i {
            let parent = bones[index].name.clone();
            bones[i].parent = Some(parent);
        } else {
            match (strictness, &root_name) {
                (Strictness::Lenient, Some(root)) => {
                    bones[i].parent = Some(root.clone());
                }
                _ => {
                    return Err(Error::OutOfRangeIndex {
                        table: "bone",
                        index,
                        len: i,
                        offset,
                    });
                }
            }
        }
    }

    Ok(bones)
}

fn read_ik_constraints(
    input: &mut ByteReader<'_>,
    tables: &mut RefTables,
    strictness: Strictness,
) -> Result<Vec<IkConstraint>, Error> {
    let count = input.read_count()?;
    let mut constraints = Vec::with_capacity(count);
    for _ in 0..count {
        let name = input.read_string()?.unwrap_or_default();
        let bone_count = input.read_count()?;
        let mut bones = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            let offset = input.cursor;
            let index = input.read_varint(true)? as usize;
            bones.push(tables.bone_name(index, offset, strictness)?);
        }
        let target_offset = input.cursor;
        let target_index = input.read_varint(true)? as usize;
        let target = tables.bone_name(target_index, target_offset, strictness)?;
        let mix = input.read_f32()?;
        // One byte under either layout: legacy streams store a bend
        // direction, modern ones a bend-positive flag with the solver order
        // fixed to declaration order.
        let bend_positive = input.read_bool()?;
        tables.iks.push(name.clone());
        constraints.push(IkConstraint {
            name,
            bones,
            target,
            mix,
            bend_positive,
        });
    }
    Ok(constraints)
}

fn read_slots(
    input: &mut ByteReader<'_>,
    tables: &mut RefTables,
    strictness: Strictness,
) -> Result<Vec<Slot>, Error> {
    let count = input.read_count()?;
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let name = input.read_string()?.unwrap_or_default();
        let bone_offset = input.cursor;
        let bone_index = input.read_varint(true)? as usize;
        let bone = tables.bone_name(bone_index, bone_offset, strictness)?;
        let color = input.read_color()?;
        let attachment = input.read_string()?;
        // One byte under either layout: legacy streams call it "additive",
        // modern ones select the blend mode.
        let blend = if input.read_bool()? {
            BlendMode::Additive
        } else {
            BlendMode::Normal
        };
        tables.slots.push(name.clone());
        slots.push(Slot {
            name,
            bone,
            color,
            attachment,
            blend,
        });
    }
    Ok(slots)
}

fn read_attachment(input: &mut ByteReader<'_>, nonessential: bool) -> Result<Attachment, Error> {
    let name = input.read_string()?;
    let tag_offset = input.cursor;
    let tag = input.read_u8()?;
    match tag {
        ATTACHMENT_REGION => {
            let path = input.read_string()?;
            let x = input.read_f32()?;
            let y = input.read_f32()?;
            let scale_x = input.read_f32()?;
            let scale_y = input.read_f32()?;
            let rotation = input.read_f32()?;
            let width = input.read_f32()?;
            let height = input.read_f32()?;
            let color = input.read_color()?;
            Ok(Attachment::Region(RegionAttachment {
                name,
                path,
                x,
                y,
                scale_x,
                scale_y,
                rotation,
                width,
                height,
                color,
            }))
        }
        ATTACHMENT_BOUNDING_BOX => {
            let vertices = read_f32_array(input)?;
            Ok(Attachment::BoundingBox(BoundingBoxAttachment {
                name,
                vertices,
            }))
        }
        ATTACHMENT_MESH => {
            let path = input.read_string()?;
            let uvs = read_f32_array(input)?;
            let triangles = read_u16_array(input)?;
            let vertices = read_f32_array(input)?;
            let color = input.read_color()?;
            let hull = input.read_varint(true)? as u32;
            let (edges, width, height) = read_mesh_extras(input, nonessential)?;
            Ok(Attachment::Mesh(MeshAttachment {
                name,
                path,
                uvs,
                triangles,
                vertices,
                color,
                hull,
                edges,
                width,
                height,
            }))
        }
        ATTACHMENT_SKINNED_MESH => {
            let path = input.read_string()?;
            let uvs = read_f32_array(input)?;
            let triangles = read_u16_array(input)?;
            let vertex_count = input.read_count()?;
            let mut vertices = Vec::new();
            for _ in 0..vertex_count {
                let bone_count = input.read_count()?;
                vertices.push(bone_count as f32);
                for _ in 0..bone_count {
                    vertices.push(input.read_varint(true)? as f32);
                    vertices.push(input.read_f32()?);
                    vertices.push(input.read_f32()?);
                    vertices.push(input.read_f32()?);
                }
            }
            let color = input.read_color()?;
            let hull = input.read_varint(true)? as u32;
            let (edges, width, height) = read_mesh_extras(input, nonessential)?;
            Ok(Attachment::SkinnedMesh(SkinnedMeshAttachment {
                name,
                path,
                uvs,
                triangles,
                vertices,
                color,
                hull,
                edges,
                width,
                height,
            }))
        }
        other => Err(Error::UnknownTypeTag {
            kind: "attachment",
            tag: other,
            offset: tag_offset,
        }),
    }
}

fn read_f32_array(input: &mut ByteReader<'_>) -> Result<Vec<f32>, Error> {
    let count = input.read_count()?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(input.read_f32()?);
    }
    Ok(out)
}

fn read_u16_array(input: &mut ByteReader<'_>) -> Result<Vec<u16>, Error> {
    let count = input.read_count()?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(input.read_u16_be()?);
    }
    Ok(out)
}

fn read_u32_array(input: &mut ByteReader<'_>) -> Result<Vec<u32>, Error> {
    let count = input.read_count()?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(input.read_varint(true)? as u32);
    }
    Ok(out)
}

fn read_mesh_extras(
    input: &mut ByteReader<'_>,
    nonessential: bool,
) -> Result<(Option<Vec<u32>>, Option<f32>, Option<f32>), Error> {
    if !nonessential {
        return Ok((None, None, None));
    }
    let edges = read_u32_array(input)?;
    let width = input.read_f32()?;
    let height = input.read_f32()?;
    Ok((Some(edges), Some(width), Some(height)))
}

fn read_skin(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    nonessential: bool,
    strictness: Strictness,
) -> Result<Option<Skin>, Error> {
    let slot_count = input.read_count()?;
    if slot_count == 0 {
        return Ok(None);
    }
    let mut skin = Skin::new();
    for _ in 0..slot_count {
        let slot_offset = input.cursor;
        let slot_index = input.read_varint(true)? as usize;
        let slot = tables.slot_name(slot_index, slot_offset, strictness)?;
        let attachment_count = input.read_count()?;
        for _ in 0..attachment_count {
            let key = input.read_string()?.unwrap_or_default();
            // The attachment is consumed even when the slot did not resolve,
            // to keep the cursor in sync under lenient decoding.
            let attachment = read_attachment(input, nonessential)?;
            if let Some(slot) = &slot {
                skin.entry(slot.clone())
                    .or_default()
                    .insert(key, attachment);
            }
        }
    }
    Ok(Some(skin))
}

fn read_skins(
    input: &mut ByteReader<'_>,
    tables: &mut RefTables,
    nonessential: bool,
    strictness: Strictness,
) -> Result<BTreeMap<String, Skin>, Error> {
    let mut skins = BTreeMap::new();
    if let Some(default_skin) = read_skin(input, tables, nonessential, strictness)? {
        tables.skins.push("default".to_string());
        skins.insert("default".to_string(), default_skin);
    }
    let named_count = input.read_count()?;
    for _ in 0..named_count {
        let name = input.read_string()?.unwrap_or_default();
        tables.skins.push(name.clone());
        if let Some(skin) = read_skin(input, tables, nonessential, strictness)? {
            skins.insert(name, skin);
        }
    }
    Ok(skins)
}

fn read_events(input: &mut ByteReader<'_>) -> Result<Vec<(String, EventDefinition)>, Error> {
    let count = input.read_count()?;
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let name = input.read_string()?.unwrap_or_default();
        let int_value = input.read_varint(false)?;
        let float_value = input.read_f32()?;
        let string_value = input.read_string()?;
        events.push((
            name,
            EventDefinition {
                int_value,
                float_value,
                string_value,
            },
        ));
    }
    Ok(events)
}

fn read_curve(input: &mut ByteReader<'_>) -> Result<Curve, Error> {
    let offset = input.cursor;
    match input.read_u8()? {
        CURVE_LINEAR => Ok(Curve::Linear),
        CURVE_STEPPED => Ok(Curve::Stepped),
        CURVE_BEZIER => Ok(Curve::Bezier {
            cx1: input.read_f32()?,
            cy1: input.read_f32()?,
            cx2: input.read_f32()?,
            cy2: input.read_f32()?,
        }),
        tag => Err(Error::UnknownTypeTag {
            kind: "curve",
            tag,
            offset,
        }),
    }
}

/// Reads the trailing curve of a frame, except on the final frame of the
/// timeline, which never carries one.
fn read_frame_curve(
    input: &mut ByteReader<'_>,
    frame: usize,
    frame_count: usize,
) -> Result<Curve, Error> {
    if frame + 1 == frame_count {
        Ok(Curve::Linear)
    } else {
        read_curve(input)
    }
}

fn read_slot_timelines(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let slot_count = input.read_count()?;
    for _ in 0..slot_count {
        let slot_offset = input.cursor;
        let slot_index = input.read_varint(true)? as usize;
        let slot = tables.slot_name(slot_index, slot_offset, strictness)?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let tag_offset = input.cursor;
            let tag = input.read_u8()?;
            let frame_count = input.read_count()?;
            let mut timelines = SlotTimelines::default();
            match tag {
                TIMELINE_COLOR => {
                    for frame in 0..frame_count {
                        timelines.color.push(ColorFrame {
                            time: input.read_f32()?,
                            color: input.read_color()?,
                            curve: read_frame_curve(input, frame, frame_count)?,
                        });
                    }
                }
                TIMELINE_ATTACHMENT => {
                    for _ in 0..frame_count {
                        timelines.attachment.push(AttachmentFrame {
                            time: input.read_f32()?,
                            name: input.read_string()?,
                        });
                    }
                }
                other => {
                    return Err(Error::UnknownTypeTag {
                        kind: "slot timeline",
                        tag: other,
                        offset: tag_offset,
                    });
                }
            }
            if let Some(slot) = &slot {
                let entry = animation.slots.entry(slot.clone()).or_default();
                entry.color.extend(timelines.color);
                entry.attachment.extend(timelines.attachment);
            }
        }
    }
    Ok(())
}

fn read_bone_timelines(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    profile: FormatProfile,
    version: &str,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let bone_count = input.read_count()?;
    for _ in 0..bone_count {
        let bone_offset = input.cursor;
        let bone_index = input.read_varint(true)? as usize;
        let bone = tables.bone_name(bone_index, bone_offset, strictness)?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let tag_offset = input.cursor;
            let tag = input.read_u8()?;
            let frame_count = input.read_count()?;
            let entry = animation.bones.entry(bone.clone()).or_default();
            match tag {
                TIMELINE_ROTATE => {
                    for frame in 0..frame_count {
                        entry.rotate.push(RotateFrame {
                            time: input.read_f32()?,
                            angle: input.read_f32()?,
                            curve: read_frame_curve(input, frame, frame_count)?,
                        });
                    }
                }
                TIMELINE_TRANSLATE | TIMELINE_SCALE => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        frames.push(XyFrame {
                            time: input.read_f32()?,
                            x: input.read_f32()?,
                            y: input.read_f32()?,
                            curve: read_frame_curve(input, frame, frame_count)?,
                        });
                    }
                    if tag == TIMELINE_TRANSLATE {
                        entry.translate.extend(frames);
                    } else {
                        entry.scale.extend(frames);
                    }
                }
                TIMELINE_FLIPX | TIMELINE_FLIPY => {
                    if profile == FormatProfile::Legacy {
                        return Err(Error::UnsupportedVersionFeature {
                            feature: "flip timeline",
                            version: version.to_string(),
                            offset: tag_offset,
                        });
                    }
                    // Rewritten as scale keys: sign flip on the flipped
                    // axis, 1 on the other.
                    for _ in 0..frame_count {
                        let time = input.read_f32()?;
                        let flipped = if input.read_bool()? { -1.0 } else { 1.0 };
                        let (x, y) = if tag == TIMELINE_FLIPX {
                            (flipped, 1.0)
                        } else {
                            (1.0, flipped)
                        };
                        entry.scale.push(XyFrame {
                            time,
                            x,
                            y,
                            curve: Curve::Linear,
                        });
                    }
                }
                other => {
                    return Err(Error::UnknownTypeTag {
                        kind: "bone timeline",
                        tag: other,
                        offset: tag_offset,
                    });
                }
            }
        }
    }
    Ok(())
}

fn read_ik_timelines(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let count = input.read_count()?;
    for _ in 0..count {
        let ik_offset = input.cursor;
        let ik_index = input.read_varint(true)? as usize;
        let ik = tables.ik_name(ik_index, ik_offset, strictness)?;
        let frame_count = input.read_count()?;
        let mut frames = Vec::with_capacity(frame_count);
        for frame in 0..frame_count {
            frames.push(IkFrame {
                time: input.read_f32()?,
                mix: input.read_f32()?,
                bend_positive: input.read_bool()?,
                curve: read_frame_curve(input, frame, frame_count)?,
            });
        }
        if let Some(ik) = ik {
            animation.ik.insert(ik, frames);
        }
    }
    Ok(())
}

fn read_ffd_timelines(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let skin_count = input.read_count()?;
    for _ in 0..skin_count {
        let skin_offset = input.cursor;
        let skin_index = input.read_varint(true)? as usize;
        let skin = tables.skin_name(skin_index, skin_offset, strictness)?;
        let slot_count = input.read_count()?;
        for _ in 0..slot_count {
            let slot_offset = input.cursor;
            let slot_index = input.read_varint(true)? as usize;
            let slot = tables.slot_name(slot_index, slot_offset, strictness)?;
            let timeline_count = input.read_count()?;
            for _ in 0..timeline_count {
                let mesh = input.read_string()?.unwrap_or_default();
                let frame_count = input.read_count()?;
                let mut frames = Vec::with_capacity(frame_count);
                for frame in 0..frame_count {
                    let time = input.read_f32()?;
                    // Sparse run: a length of 0 keys the setup pose, else a
                    // start offset plus that many vertex deltas.
                    let run = input.read_count()?;
                    let (offset, vertices) = if run == 0 {
                        (0, Vec::new())
                    } else {
                        let offset = input.read_varint(true)? as u32;
                        let mut vertices = Vec::with_capacity(run);
                        for _ in 0..run {
                            vertices.push(input.read_f32()?);
                        }
                        (offset, vertices)
                    };
                    frames.push(FfdFrame {
                        time,
                        offset,
                        vertices,
                        curve: read_frame_curve(input, frame, frame_count)?,
                    });
                }
                if let (Some(skin), Some(slot)) = (&skin, &slot) {
                    animation
                        .ffd
                        .entry(skin.clone())
                        .or_default()
                        .entry(slot.clone())
                        .or_default()
                        .insert(mesh, frames);
                }
            }
        }
    }
    Ok(())
}

fn read_draw_order_timeline(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let frame_count = input.read_count()?;
    for _ in 0..frame_count {
        let time = input.read_f32()?;
        let offset_count = input.read_count()?;
        let mut offsets = Vec::with_capacity(offset_count);
        for _ in 0..offset_count {
            let slot_offset = input.cursor;
            let slot_index = input.read_varint(true)? as usize;
            let slot = tables.slot_name(slot_index, slot_offset, strictness)?;
            let offset = input.read_varint(false)?;
            if let Some(slot) = slot {
                offsets.push(DrawOrderOffset { slot, offset });
            }
        }
        animation.draw_order.push(DrawOrderFrame { time, offsets });
    }
    Ok(())
}

fn read_event_timeline(
    input: &mut ByteReader<'_>,
    event_defs: &[(String, EventDefinition)],
    profile: FormatProfile,
    version: &str,
    strictness: Strictness,
    animation: &mut Animation,
) -> Result<(), Error> {
    let count_offset = input.cursor;
    // Raw count: the legacy rejection must see the nonzero count even when
    // the stream ends right behind it. The frame loop allocates nothing up
    // front, so an unbacked count simply runs into the EOF.
    let frame_count = input.read_varint(true)? as usize;
    if frame_count > 0 && profile == FormatProfile::Legacy {
        return Err(Error::UnsupportedVersionFeature {
            feature: "event timeline",
            version: version.to_string(),
            offset: count_offset,
        });
    }
    for _ in 0..frame_count {
        let time = input.read_f32()?;
        let index_offset = input.cursor;
        let event_index = input.read_varint(true)? as usize;
        let def = match event_defs.get(event_index) {
            Some(def) => Some(def),
            None if strictness == Strictness::Lenient => None,
            None => {
                return Err(Error::OutOfRangeIndex {
                    table: "event",
                    index: event_index,
                    len: event_defs.len(),
                    offset: index_offset,
                });
            }
        };
        let int_value = input.read_varint(false)?;
        let float_value = input.read_f32()?;
        let string_value = if input.read_bool()? {
            input.read_string()?
        } else {
            None
        };
        if let Some((name, defaults)) = def {
            animation.events.push(EventFrame {
                time,
                name: name.clone(),
                int_value,
                float_value,
                string_value: string_value.or_else(|| defaults.string_value.clone()),
            });
        }
    }
    Ok(())
}

fn read_animations(
    input: &mut ByteReader<'_>,
    tables: &RefTables,
    event_defs: &[(String, EventDefinition)],
    profile: FormatProfile,
    version: &str,
    strictness: Strictness,
) -> Result<BTreeMap<String, Animation>, Error> {
    let count = input.read_count()?;
    let mut animations = BTreeMap::new();
    for _ in 0..count {
        let name = input.read_string()?.unwrap_or_default();
        let mut animation = Animation::default();
        read_slot_timelines(input, tables, strictness, &mut animation)?;
        read_bone_timelines(input, tables, profile, version, strictness, &mut animation)?;
        read_ik_timelines(input, tables, strictness, &mut animation)?;
        read_ffd_timelines(input, tables, strictness, &mut animation)?;
        read_draw_order_timeline(input, tables, strictness, &mut animation)?;
        read_event_timeline(input, event_defs, profile, version, strictness, &mut animation)?;
        animations.insert(name, animation);
    }
    Ok(animations)
}

/// Removes every legacy skinned-mesh attachment from the decoded skins,
/// returning how many entries were dropped. The playback engine this
/// document feeds has no renderer for that representation.
fn strip_skinned_meshes(skins: &mut BTreeMap<String, Skin>) -> usize {
    let mut dropped = 0;
    for skin in skins.values_mut() {
        for attachments in skin.values_mut() {
            let before = attachments.len();
            attachments.retain(|_, a| !matches!(a, Attachment::SkinnedMesh(_)));
            dropped += before - attachments.len();
        }
        skin.retain(|_, attachments| !attachments.is_empty());
    }
    dropped
}

/// Decodes a binary skeleton buffer into a document, also returning the
/// non-fatal decode observations.
pub fn decode_with_stats(
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<(SkeletonDocument, DecodeStats), Error> {
    let strictness = options.strictness;
    let mut input = ByteReader::new(bytes);
    let mut tables = RefTables::default();

    let (skeleton, profile, nonessential) = read_header(&mut input)?;
    let version = skeleton.version.clone();

    let bones = read_bones(&mut input, profile, nonessential, strictness)?;
    tables.bones = bones.iter().map(|b| b.name.clone()).collect();
    let ik = read_ik_constraints(&mut input, &mut tables, strictness)?;
    let slots = read_slots(&mut input, &mut tables, strictness)?;
    let mut skins = read_skins(&mut input, &mut tables, nonessential, strictness)?;
    let event_defs = read_events(&mut input)?;
    let animations = read_animations(
        &mut input,
        &tables,
        &event_defs,
        profile,
        &version,
        strictness,
    )?;

    let trailing_bytes = input.remaining();
    if trailing_bytes != 0 {
        log::warn!(
            "skeleton buffer has {trailing_bytes} unread trailing byte(s) (len={}, cursor={})",
            bytes.len(),
            input.cursor
        );
    }
    let dropped_attachments = strip_skinned_meshes(&mut skins);
    if dropped_attachments != 0 {
        log::debug!("dropped {dropped_attachments} skinned-mesh attachment(s) from decoded skins");
    }
    let stats = DecodeStats {
        dropped_attachments,
        trailing_bytes,
    };

    Ok((
        SkeletonDocument {
            skeleton,
            bones,
            ik,
            slots,
            skins,
            events: event_defs.into_iter().collect(),
            animations,
        },
        stats,
    ))
}

/// Decodes a binary skeleton buffer into a document.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<SkeletonDocument, Error> {
    decode_with_stats(bytes, options).map(|(document, _)| document)
}

impl SkeletonDocument {
    /// Decodes a binary skeleton buffer under strict resolution.
    pub fn from_skel_bytes(bytes: &[u8]) -> Result<Self, Error> {
        decode(bytes, &DecodeOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteReader, MAX_STRING_BYTES};
    use crate::Error;

    fn push_varint(out: &mut Vec<u8>, mut value: u32) {
        loop {
            let mut b = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                b |= 0x80;
            }
            out.push(b);
            if value == 0 {
                break;
            }
        }
    }

    fn encode_signed(value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        push_varint(&mut out, ((value << 1) ^ (value >> 31)) as u32);
        out
    }

    #[test]
    fn signed_varint_round_trip() {
        for value in [
            0,
            1,
            -1,
            63,
            -64,
            64,
            8191,
            -8192,
            1 << 20,
            -(1 << 20),
            (1 << 28) - 1,
            -(1 << 28),
        ] {
            let bytes = encode_signed(value);
            let mut input = ByteReader::new(&bytes);
            assert_eq!(input.read_varint(false).expect("varint"), value, "{value}");
            assert_eq!(input.remaining(), 0, "{value}: all bytes consumed");
        }
    }

    #[test]
    fn signed_varint_boundary_widths() {
        // Just below / at each 7-bit group boundary after zigzag.
        for (value, width) in [(63, 1), (64, 2), (1 << 13, 3), (1 << 20, 4)] {
            assert_eq!(encode_signed(value).len(), width, "{value}");
        }
    }

    #[test]
    fn varint_stops_after_five_bytes() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x7f, 0x00];
        let mut input = ByteReader::new(&bytes);
        let _ = input.read_varint(true).expect("varint");
        assert_eq!(input.remaining(), 1);
    }

    #[test]
    fn count_must_be_backed_by_remaining_bytes() {
        // 3 elements, 3 bytes behind the count: fine.
        let bytes = [0x03, 0, 0, 0];
        let mut input = ByteReader::new(&bytes);
        assert_eq!(input.read_count().expect("count"), 3);

        // 4 elements, 3 bytes behind the count: EOF at the count itself.
        let bytes = [0x04, 0, 0, 0];
        let mut input = ByteReader::new(&bytes);
        match input.read_count() {
            Err(Error::PrematureEof { offset }) => assert_eq!(offset, 0),
            other => panic!("expected PrematureEof, got {other:?}"),
        }

        // A 5-byte varint wrapping negative is never a valid count.
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x0f];
        let mut input = ByteReader::new(&bytes);
        assert!(matches!(
            input.read_count(),
            Err(Error::PrematureEof { offset: 0 })
        ));
    }

    #[test]
    fn string_length_zero_and_one_are_absent() {
        for lead in [0u8, 1u8] {
            let bytes = [lead, b'x'];
            let mut input = ByteReader::new(&bytes);
            assert_eq!(input.read_string().expect("string"), None);
        }
    }

    #[test]
    fn string_reads_length_minus_one_bytes() {
        let mut bytes = vec![4];
        bytes.extend_from_slice(b"abc!");
        let mut input = ByteReader::new(&bytes);
        assert_eq!(input.read_string().expect("string").as_deref(), Some("abc"));
        assert_eq!(input.remaining(), 1);
    }

    #[test]
    fn string_clamps_oversized_payload_but_consumes_it() {
        let mut bytes = vec![255];
        bytes.extend(std::iter::repeat_n(b'a', 254));
        bytes.push(b'Z');
        let mut input = ByteReader::new(&bytes);
        let s = input.read_string().expect("string").expect("present");
        assert_eq!(s.len(), MAX_STRING_BYTES);
        // Cursor advanced over the declared payload, not the kept part.
        assert_eq!(input.read_u8().expect("tail"), b'Z');
    }

    #[test]
    fn string_clamp_trims_split_char() {
        // 199 ascii bytes then a 2-byte char straddling the clamp point.
        let mut payload = vec![b'a'; MAX_STRING_BYTES - 1];
        payload.extend_from_slice("é".as_bytes());
        let mut bytes = vec![(payload.len() + 1) as u8];
        bytes.extend_from_slice(&payload);
        let mut input = ByteReader::new(&bytes);
        let s = input.read_string().expect("string").expect("present");
        assert_eq!(s.len(), MAX_STRING_BYTES - 1);
        assert!(s.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn invalid_utf8_is_rejected_with_offset() {
        let bytes = [3, 0xff, 0xfe];
        let mut input = ByteReader::new(&bytes);
        match input.read_string() {
            Err(Error::InvalidUtf8 { offset }) => assert_eq!(offset, 0),
            other => panic!("expected InvalidUtf8, got {other:?}"),
        }
    }

    #[test]
    fn float_bytes_are_reversed_relative_to_ints() {
        let bytes = 1.5f32.to_le_bytes();
        let mut input = ByteReader::new(&bytes);
        assert_eq!(input.read_f32().expect("float"), 1.5);
    }

    #[test]
    fn color_renders_as_rgba_hex() {
        let bytes = [0xff, 0x7f, 0x00, 0xff];
        let mut input = ByteReader::new(&bytes);
        assert_eq!(input.read_color().expect("color"), "ff7f00ff");
    }

    #[test]
    fn reads_past_the_end_fail_with_offset() {
        let mut input = ByteReader::new(&[0x01, 0x02]);
        input.read_u8().expect("first");
        match input.read_i32_be() {
            Err(Error::PrematureEof { offset }) => assert_eq!(offset, 1),
            other => panic!("expected PrematureEof, got {other:?}"),
        }
    }
}
