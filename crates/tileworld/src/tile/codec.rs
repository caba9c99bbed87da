//! Line-oriented text format for a single tile, one `<TAG>value</TAG>` per line.
//!
//! Decoding is lenient: unknown tags and malformed values are skipped so older
//! readers keep working when new tags are added.

use std::fmt::Write as _;

use tracing::debug;

use crate::geometry::Position;

use super::{Direction, Rotation, Tile, EMPTY_TILE_NAME};

const TAG_BASE_MODEL: &str = "BM";
const TAG_BASE_ROTATION: &str = "BR";
const TAG_FLUIDITY: &str = "TF";
const TAG_OBJECT: &str = "GO";

const NEIGHBOR_TAGS: [(&str, Direction); 8] = [
    ("SU", Direction::Up),
    ("SD", Direction::Down),
    ("SL", Direction::Left),
    ("SR", Direction::Right),
    ("UL", Direction::UpLeft),
    ("UR", Direction::UpRight),
    ("DL", Direction::DownLeft),
    ("DR", Direction::DownRight),
];

pub fn encode_tile(tile: &Tile) -> String {
    let mut out = String::new();
    push_field(
        &mut out,
        TAG_BASE_MODEL,
        tile.base_model_raw().unwrap_or(EMPTY_TILE_NAME),
    );
    push_field(&mut out, TAG_BASE_ROTATION, tile.base_rotation().as_tag());
    for (tag, direction) in NEIGHBOR_TAGS {
        push_field(
            &mut out,
            tag,
            tile.neighbor_raw(direction).unwrap_or(EMPTY_TILE_NAME),
        );
    }
    push_field(&mut out, TAG_FLUIDITY, &format_decimal(tile.fluidity()));
    for object in tile.objects() {
        let value = format!(
            "{},{},{},{},{}",
            object.model_ref,
            format_decimal(object.local_position.x),
            format_decimal(object.local_position.y),
            format_decimal(object.local_position.z),
            format_decimal(object.rotation_degrees),
        );
        push_field(&mut out, TAG_OBJECT, &value);
    }
    out
}

/// Builds a tile named `name` from `text`. Never fails; a tile with no
/// recognizable lines decodes to an impassable tile with no content.
pub fn decode_tile(name: &str, text: &str) -> Tile {
    let mut tile = Tile::blank(name.to_string(), 0.0);
    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((tag, value)) = split_field(line) else {
            debug!(tile = name, line = line_number + 1, "tile_line_unrecognized");
            continue;
        };
        if !apply_field(&mut tile, tag, value) {
            debug!(
                tile = name,
                line = line_number + 1,
                tag,
                "tile_line_skipped"
            );
        }
    }
    tile
}

fn apply_field(tile: &mut Tile, tag: &str, value: &str) -> bool {
    match tag {
        TAG_BASE_MODEL => tile.set_base_model(value),
        TAG_BASE_ROTATION => match Rotation::from_tag(value) {
            Some(rotation) => tile.set_base_rotation(rotation),
            None => return false,
        },
        TAG_FLUIDITY => match value.parse::<f32>() {
            Ok(fluidity) if !fluidity.is_nan() => tile.set_fluidity(fluidity),
            _ => return false,
        },
        TAG_OBJECT => match parse_object(value) {
            Some((model_ref, position, rotation)) => tile.add_model(model_ref, position, rotation),
            None => return false,
        },
        _ => match NEIGHBOR_TAGS.iter().find(|(known, _)| *known == tag) {
            Some((_, direction)) => tile.set_neighbor(*direction, value),
            None => return false,
        },
    }
    true
}

/// Whether `model_ref` survives a `<GO>` line unchanged. Commas and
/// surrounding spaces are kept; line breaks would split the record.
pub fn is_encodable_model_ref(model_ref: &str) -> bool {
    !model_ref.is_empty() && !model_ref.contains(['\n', '\r'])
}

// The numeric fields are taken from the right so the model ref may itself
// contain commas. The ref is kept verbatim.
fn parse_object(value: &str) -> Option<(&str, Position, f32)> {
    let mut fields = value.rsplitn(5, ',');
    let mut number = || fields.next()?.trim().parse::<f32>().ok();
    let rotation = number()?;
    let z = number()?;
    let y = number()?;
    let x = number()?;
    let model_ref = fields.next()?;
    if model_ref.is_empty() {
        return None;
    }
    let position = Position::new(x, y, z);
    if !position.is_finite() || !rotation.is_finite() {
        return None;
    }
    Some((model_ref, position, rotation))
}

/// Splits `<XX>value</XX>` into `("XX", "value")`.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('<')?;
    let (tag, rest) = rest.split_once('>')?;
    let value = rest.strip_suffix('>')?;
    let value = value.strip_suffix(tag)?;
    let value = value.strip_suffix("</")?;
    if tag.is_empty() {
        return None;
    }
    Some((tag, value))
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "<{tag}>{value}</{tag}>");
}

/// Shortest round-trip decimal, always with a fractional part (`1.0`, `0.25`).
fn format_decimal(value: f32) -> String {
    let text = value.to_string();
    if !value.is_finite() || text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::super::TileName;
    use super::*;

    fn sample_tile() -> Tile {
        let name = TileName::parse("tile_2_-1.txt").expect("name");
        let mut tile = Tile::populated(&name, "meadow", 0.75);
        tile.set_base_rotation(Rotation::Flip);
        tile.add_model("oak", Position::new(1.5, 0.0, -3.25), 90.0);
        tile.add_model("rock", Position::new(-4.0, 0.5, 2.0), 0.0);
        tile
    }

    #[test]
    fn encodes_fields_in_canonical_order() {
        let text = encode_tile(&sample_tile());
        let expected = "\
<BM>meadow</BM>
<BR>Flip</BR>
<SU>tile_2_-2.txt</SU>
<SD>tile_2_0.txt</SD>
<SL>tile_1_-1.txt</SL>
<SR>tile_3_-1.txt</SR>
<UL>tile_1_-2.txt</UL>
<UR>tile_3_-2.txt</UR>
<DL>tile_1_0.txt</DL>
<DR>tile_3_0.txt</DR>
<TF>0.75</TF>
<GO>oak,1.5,0.0,-3.25,90.0</GO>
<GO>rock,-4.0,0.5,2.0,0.0</GO>
";
        assert_eq!(text, expected);
    }

    #[test]
    fn encode_decode_encode_is_byte_identical() {
        let first = encode_tile(&sample_tile());
        let decoded = decode_tile("tile_2_-1.txt", &first);
        let second = encode_tile(&decoded);
        assert_eq!(first, second);
        assert_eq!(decoded.fluidity(), 0.75);
        assert_eq!(decoded.objects().len(), 2);
        assert_eq!(decoded.base_rotation(), Rotation::Flip);
    }

    #[test]
    fn model_refs_with_commas_and_padding_survive_reload() {
        let name = TileName::parse("tile_0_0.txt").expect("name");
        let mut tile = Tile::populated(&name, "meadow", 1.0);
        tile.add_model("crate,large", Position::new(1.0, 0.0, 2.0), 0.0);
        tile.add_model(" padded ", Position::new(-3.0, 0.5, 4.0), 180.0);

        let first = encode_tile(&tile);
        let decoded = decode_tile("tile_0_0.txt", &first);
        let second = encode_tile(&decoded);

        assert_eq!(first, second);
        let refs: Vec<&str> = decoded
            .objects()
            .iter()
            .map(|object| object.model_ref.as_str())
            .collect();
        assert_eq!(refs, ["crate,large", " padded "]);
        assert_eq!(decoded.objects()[1].local_position, Position::new(-3.0, 0.5, 4.0));
    }

    #[test]
    fn line_breaks_make_a_model_ref_unencodable() {
        assert!(is_encodable_model_ref("crate,large"));
        assert!(is_encodable_model_ref(" padded "));
        assert!(!is_encodable_model_ref(""));
        assert!(!is_encodable_model_ref("two\nlines"));
        assert!(!is_encodable_model_ref("carriage\rreturn"));
    }

    #[test]
    fn empty_fields_decode_to_sentinel() {
        let tile = decode_tile("tile_0_0.txt", "<BM></BM>\n<SU></SU>\n<TF>1.0</TF>\n");
        assert_eq!(tile.base_model(), EMPTY_TILE_NAME);
        assert_eq!(tile.neighbor_name(Direction::Up), EMPTY_TILE_NAME);
        assert_eq!(tile.neighbor_name(Direction::DownLeft), EMPTY_TILE_NAME);
        assert_eq!(tile.fluidity(), 1.0);
    }

    #[test]
    fn unknown_and_malformed_lines_are_skipped() {
        let text = "\
<BM>meadow</BM>
<XX>future tag</XX>
garbage without tags
<BR>Sideways</BR>
<TF>not a number</TF>
<GO>oak,1.0,2.0</GO>
<GO>oak,1.0,0.0,2.0,45.0</GO>
<SU>tile_0_-1.txt</SD>
";
        let tile = decode_tile("tile_0_0.txt", text);
        assert_eq!(tile.base_model(), "meadow");
        assert_eq!(tile.base_rotation(), Rotation::None);
        assert_eq!(tile.fluidity(), 0.0);
        assert_eq!(tile.objects().len(), 1);
        assert_eq!(tile.objects()[0].rotation_degrees, 45.0);
        assert_eq!(tile.neighbor_name(Direction::Up), EMPTY_TILE_NAME);
    }

    #[test]
    fn field_order_does_not_matter() {
        let text = "<TF>0.5</TF>\n<GO>oak,0.0,0.0,0.0,0.0</GO>\n<BM>sand</BM>\n";
        let tile = decode_tile("tile_0_0.txt", text);
        assert_eq!(tile.fluidity(), 0.5);
        assert_eq!(tile.base_model(), "sand");
        assert_eq!(tile.objects().len(), 1);
    }

    #[test]
    fn out_of_range_fluidity_is_clamped() {
        let tile = decode_tile("tile_0_0.txt", "<TF>3.5</TF>\n");
        assert_eq!(tile.fluidity(), 1.0);
    }

    #[test]
    fn split_field_requires_matching_close_tag() {
        assert_eq!(split_field("<TF>1.0</TF>"), Some(("TF", "1.0")));
        assert_eq!(split_field("<TF></TF>"), Some(("TF", "")));
        assert_eq!(split_field("<TF>1.0</BM>"), None);
        assert_eq!(split_field("TF>1.0</TF>"), None);
    }

    #[test]
    fn decimals_always_carry_fraction() {
        assert_eq!(format_decimal(1.0), "1.0");
        assert_eq!(format_decimal(0.0), "0.0");
        assert_eq!(format_decimal(-4.0), "-4.0");
        assert_eq!(format_decimal(0.25), "0.25");
    }
}
