//! Parser for the stored zone polygon text.
//!
//! Two layouts are accepted:
//!
//! * `POLYGON ((x y, x y, ...))`, optionally with further `(...)` rings
//! * `MULTIPOLYGON (((x y, ...)), ((x y, ...)))`
//!
//! Some exports write multi-polygons in a compact form where every group
//! is a single ring, `MULTIPOLYGON ((x y, ...), (x y, ...))`. That form is
//! accepted as well and each group becomes its own one-ring polygon. Any
//! other delimiter between groups is rejected.

use geo::Coord;
use mobility_safety_geography_models::AffineTransform;

use crate::{DecodeError, Ring, ZoneGeometry};

/// A parenthesised group: either raw pair text or further groups.
#[derive(Debug)]
enum Group<'a> {
    Pairs(&'a str),
    Nested(Vec<Group<'a>>),
}

/// Decodes stored polygon text, mapping every raw pair through `transform`.
///
/// # Errors
///
/// * [`DecodeError::UnrecognizedFormat`] if the keyword is unknown or the
///   parentheses do not form one of the supported layouts.
/// * [`DecodeError::InvalidCoordinate`] if a pair does not hold exactly two
///   finite numbers.
pub fn decode(raw: &str, transform: &AffineTransform) -> Result<ZoneGeometry, DecodeError> {
    let text = raw.trim();
    let keyword_len = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (keyword, body) = text.split_at(keyword_len);
    let body = body.trim();

    let multi = if keyword.eq_ignore_ascii_case("POLYGON") {
        false
    } else if keyword.eq_ignore_ascii_case("MULTIPOLYGON") {
        true
    } else {
        return Err(unrecognized(format!(
            "expected POLYGON or MULTIPOLYGON, found '{}'",
            snippet(text)
        )));
    };

    if body.eq_ignore_ascii_case("EMPTY") {
        return Ok(empty(multi));
    }

    let top = Parser::new(body).parse_document()?;
    let mut rings_seen = 0;

    if multi {
        decode_multi_polygon(top, transform, &mut rings_seen)
    } else {
        decode_polygon(top, transform, &mut rings_seen).map(ZoneGeometry::Polygon)
    }
}

const fn empty(multi: bool) -> ZoneGeometry {
    if multi {
        ZoneGeometry::MultiPolygon(Vec::new())
    } else {
        ZoneGeometry::Polygon(Vec::new())
    }
}

fn decode_polygon(
    group: Group<'_>,
    transform: &AffineTransform,
    rings_seen: &mut usize,
) -> Result<Vec<Ring>, DecodeError> {
    match group {
        Group::Pairs(text) if text.trim().is_empty() => Ok(Vec::new()),
        Group::Pairs(_) => Err(unrecognized(
            "polygon coordinates must be wrapped in a ring group".to_string(),
        )),
        Group::Nested(rings) => rings
            .into_iter()
            .map(|ring| match ring {
                Group::Pairs(text) => decode_ring(text, transform, rings_seen),
                Group::Nested(_) => Err(unrecognized(
                    "polygon rings cannot contain nested groups".to_string(),
                )),
            })
            .collect(),
    }
}

fn decode_multi_polygon(
    group: Group<'_>,
    transform: &AffineTransform,
    rings_seen: &mut usize,
) -> Result<ZoneGeometry, DecodeError> {
    let children = match group {
        Group::Pairs(text) if text.trim().is_empty() => return Ok(empty(true)),
        Group::Pairs(_) => {
            return Err(unrecognized(
                "multipolygon coordinates must be wrapped in polygon groups".to_string(),
            ));
        }
        Group::Nested(children) => children,
    };

    let compact = children.iter().all(|c| matches!(c, Group::Pairs(_)));
    let standard = children.iter().all(|c| matches!(c, Group::Nested(_)));

    if compact {
        let polygons = children
            .into_iter()
            .map(|child| match child {
                Group::Pairs(text) => decode_ring(text, transform, rings_seen).map(|r| vec![r]),
                Group::Nested(_) => Err(unrecognized(
                    "multipolygon mixes ring groups and polygon groups".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::trace!("Decoded compact multipolygon with {} groups", polygons.len());
        return Ok(ZoneGeometry::MultiPolygon(polygons));
    }

    if !standard {
        return Err(unrecognized(
            "multipolygon mixes ring groups and polygon groups".to_string(),
        ));
    }

    children
        .into_iter()
        .map(|child| decode_polygon(child, transform, rings_seen))
        .collect::<Result<Vec<_>, _>>()
        .map(ZoneGeometry::MultiPolygon)
}

fn decode_ring(
    text: &str,
    transform: &AffineTransform,
    rings_seen: &mut usize,
) -> Result<Ring, DecodeError> {
    let ring = *rings_seen;
    *rings_seen += 1;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    text.split(',')
        .map(|pair| {
            let pair = pair.trim();
            let mut axes = pair.split_whitespace();
            let (Some(x), Some(y), None) = (axes.next(), axes.next(), axes.next()) else {
                return Err(DecodeError::InvalidCoordinate {
                    token: pair.to_string(),
                    ring,
                });
            };
            let x = parse_axis(x, ring)?;
            let y = parse_axis(y, ring)?;
            let (lon, lat) = transform.apply(x, y);
            Ok(Coord { x: lon, y: lat })
        })
        .collect()
}

fn parse_axis(token: &str, ring: usize) -> Result<f64, DecodeError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::InvalidCoordinate {
            token: token.to_string(),
            ring,
        })
}

fn unrecognized(message: String) -> DecodeError {
    DecodeError::UnrecognizedFormat { message }
}

fn snippet(text: &str) -> String {
    text.chars().take(24).collect()
}

/// Recursive-descent reader for the parenthesised body.
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse_document(mut self) -> Result<Group<'a>, DecodeError> {
        let group = self.parse_group()?;
        self.skip_ws();
        if self.pos < self.src.len() {
            return Err(unrecognized(format!(
                "unexpected trailing text '{}'",
                snippet(&self.src[self.pos..])
            )));
        }
        Ok(group)
    }

    fn parse_group(&mut self) -> Result<Group<'a>, DecodeError> {
        self.skip_ws();
        self.expect('(')?;
        self.skip_ws();

        if self.peek() == Some('(') {
            let mut children = Vec::new();
            loop {
                children.push(self.parse_group()?);
                self.skip_ws();
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(')') => {
                        self.pos += 1;
                        return Ok(Group::Nested(children));
                    }
                    Some(c) => {
                        return Err(unrecognized(format!(
                            "unexpected delimiter '{c}' between groups at offset {}",
                            self.pos
                        )));
                    }
                    None => return Err(unrecognized("unbalanced parentheses".to_string())),
                }
            }
        }

        let src = self.src;
        let start = self.pos;
        let rest = &src[start..];
        match rest.find(['(', ')']) {
            Some(offset) if rest.as_bytes()[offset] == b')' => {
                self.pos = start + offset + 1;
                Ok(Group::Pairs(&rest[..offset]))
            }
            Some(offset) => Err(unrecognized(format!(
                "unexpected '(' inside coordinate list at offset {}",
                start + offset
            ))),
            None => Err(unrecognized("unbalanced parentheses".to_string())),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), DecodeError> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(unrecognized(format!(
                "expected '{c}' at offset {}",
                self.pos
            )))
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }
}
