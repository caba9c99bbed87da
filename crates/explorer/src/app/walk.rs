use thiserror::Error;
use tileworld::Vector;

/// Compass headings on the map plane. North is −Z, east is +X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Heading {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Heading {
    fn parse(token: &str) -> Option<Self> {
        let heading = match token.to_ascii_uppercase().as_str() {
            "N" => Heading::North,
            "NE" => Heading::NorthEast,
            "E" => Heading::East,
            "SE" => Heading::SouthEast,
            "S" => Heading::South,
            "SW" => Heading::SouthWest,
            "W" => Heading::West,
            "NW" => Heading::NorthWest,
            _ => return None,
        };
        Some(heading)
    }

    /// Unnormalized direction; the map normalizes before moving.
    pub(crate) fn vector(self) -> Vector {
        let (x, z) = match self {
            Heading::North => (0.0, -1.0),
            Heading::NorthEast => (1.0, -1.0),
            Heading::East => (1.0, 0.0),
            Heading::SouthEast => (1.0, 1.0),
            Heading::South => (0.0, 1.0),
            Heading::SouthWest => (-1.0, 1.0),
            Heading::West => (-1.0, 0.0),
            Heading::NorthWest => (-1.0, -1.0),
        };
        Vector::new(x, 0.0, z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WalkLeg {
    pub(crate) heading: Heading,
    pub(crate) distance: f32,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum WalkParseError {
    #[error("walk entry '{entry}' is missing ':' between heading and distance")]
    MissingSeparator { entry: String },
    #[error("walk entry '{entry}' has unknown heading '{heading}'")]
    UnknownHeading { entry: String, heading: String },
    #[error("walk entry '{entry}' has invalid distance '{value}'")]
    InvalidDistance { entry: String, value: String },
}

/// Parses `"N:30,E:12.5,SW:4"` into legs. Empty entries are ignored.
pub(crate) fn parse_walk_script(raw: &str) -> Result<Vec<WalkLeg>, WalkParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_leg)
        .collect()
}

fn parse_leg(entry: &str) -> Result<WalkLeg, WalkParseError> {
    let Some((heading, distance)) = entry.split_once(':') else {
        return Err(WalkParseError::MissingSeparator {
            entry: entry.to_string(),
        });
    };
    let heading_token = heading.trim();
    let heading = Heading::parse(heading_token).ok_or_else(|| WalkParseError::UnknownHeading {
        entry: entry.to_string(),
        heading: heading_token.to_string(),
    })?;
    let distance = distance
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
        .ok_or_else(|| WalkParseError::InvalidDistance {
            entry: entry.to_string(),
            value: distance.trim().to_string(),
        })?;
    Ok(WalkLeg { heading, distance })
}

/// Hands out per-tick steps along the scripted legs.
#[derive(Debug, Clone)]
pub(crate) struct Walker {
    legs: Vec<WalkLeg>,
    current: usize,
    remaining_in_leg: f32,
}

impl Walker {
    pub(crate) fn new(legs: Vec<WalkLeg>) -> Self {
        let remaining_in_leg = legs.first().map_or(0.0, |leg| leg.distance);
        Self {
            legs,
            current: 0,
            remaining_in_leg,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.current >= self.legs.len()
    }

    /// Next step of at most `max_distance`, or `None` once every leg is done.
    pub(crate) fn next_step(&mut self, max_distance: f32) -> Option<(Heading, f32)> {
        let leg = *self.legs.get(self.current)?;
        let step = max_distance.min(self.remaining_in_leg);
        self.remaining_in_leg -= step;
        if self.remaining_in_leg <= 0.0 {
            self.advance();
        }
        Some((leg.heading, step))
    }

    /// Drops whatever is left of the current leg.
    pub(crate) fn abandon_leg(&mut self) {
        if !self.is_finished() {
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.current += 1;
        self.remaining_in_leg = self.legs.get(self.current).map_or(0.0, |leg| leg.distance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case_legs_and_skips_blank_entries() {
        let legs = parse_walk_script(" n:30, E:12.5 ,,sw:4").expect("walk");
        assert_eq!(
            legs,
            vec![
                WalkLeg {
                    heading: Heading::North,
                    distance: 30.0
                },
                WalkLeg {
                    heading: Heading::East,
                    distance: 12.5
                },
                WalkLeg {
                    heading: Heading::SouthWest,
                    distance: 4.0
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(matches!(
            parse_walk_script("N30"),
            Err(WalkParseError::MissingSeparator { .. })
        ));
        assert!(matches!(
            parse_walk_script("UP:3"),
            Err(WalkParseError::UnknownHeading { .. })
        ));
        for raw in ["N:-1", "N:0", "N:far", "N:inf"] {
            assert!(
                matches!(
                    parse_walk_script(raw),
                    Err(WalkParseError::InvalidDistance { .. })
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn north_points_toward_negative_z() {
        assert_eq!(Heading::North.vector(), Vector::new(0.0, 0.0, -1.0));
        assert_eq!(Heading::SouthEast.vector(), Vector::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn walker_splits_legs_into_bounded_steps() {
        let legs = parse_walk_script("N:5,E:2").expect("walk");
        let mut walker = Walker::new(legs);

        assert_eq!(walker.next_step(2.0), Some((Heading::North, 2.0)));
        assert_eq!(walker.next_step(2.0), Some((Heading::North, 2.0)));
        assert_eq!(walker.next_step(2.0), Some((Heading::North, 1.0)));
        assert_eq!(walker.next_step(2.0), Some((Heading::East, 2.0)));
        assert!(walker.is_finished());
        assert_eq!(walker.next_step(2.0), None);
    }

    #[test]
    fn abandoning_a_leg_moves_to_the_next() {
        let legs = parse_walk_script("N:50,W:1").expect("walk");
        let mut walker = Walker::new(legs);
        walker.next_step(3.0);
        walker.abandon_leg();
        assert_eq!(walker.next_step(3.0), Some((Heading::West, 1.0)));
        walker.abandon_leg();
        assert!(walker.is_finished());
    }
}
