//! Mode profiles: which ways are routable, at what free-flow speed,
//! and in which directions.

use crate::TravelMode;

/// Bumped whenever the class tables, speeds, or one-way rules change.
/// A cached graph built under a different profile version is rebuilt.
pub const PROFILE_VERSION: u32 = 3;

/// Highway classes the drive profile keeps, in descending importance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HighwayClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Unclassified,
    Service,
}

impl HighwayClass {
    /// Maps an OSM `highway=*` value to a drivable class.
    /// Link roads (ramps) inherit the class they connect.
    pub fn from_tag(value: &str) -> Option<HighwayClass> {
        Some(match value {
            "motorway" | "motorway_link" => HighwayClass::Motorway,
            "trunk" | "trunk_link" => HighwayClass::Trunk,
            "primary" | "primary_link" => HighwayClass::Primary,
            "secondary" | "secondary_link" => HighwayClass::Secondary,
            "tertiary" | "tertiary_link" => HighwayClass::Tertiary,
            "residential" => HighwayClass::Residential,
            "unclassified" => HighwayClass::Unclassified,
            "service" => HighwayClass::Service,
            _ => return None,
        })
    }

    /// Free-flow speed in meters per second.
    pub fn free_flow_mps(self) -> f64 {
        const KMH_TO_MPS: f64 = 1.0 / 3.6;
        let kmh = match self {
            HighwayClass::Motorway => 105.0,
            HighwayClass::Trunk => 90.0,
            HighwayClass::Primary => 65.0,
            HighwayClass::Secondary => 55.0,
            HighwayClass::Tertiary => 45.0,
            HighwayClass::Residential => 30.0,
            HighwayClass::Unclassified => 40.0,
            HighwayClass::Service => 20.0,
        };
        kmh * KMH_TO_MPS
    }
}

/// Typical unhurried walking pace.
pub const WALK_SPEED_MPS: f64 = 1.4;

const WALKABLE: &[&str] = &[
    "footway",
    "path",
    "pedestrian",
    "steps",
    "track",
    "cycleway",
    "bridleway",
    "living_street",
    "residential",
    "service",
    "unclassified",
    "tertiary",
    "tertiary_link",
    "secondary",
    "secondary_link",
    "primary",
    "primary_link",
];

/// How a kept way contributes edges.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WaySpec {
    pub speed_mps: f64,
    pub forward: bool,
    pub backward: bool,
}

/// Evaluates a way's tags under a mode profile.
///
/// Returns `None` if the way is not routable for the mode. Tags are the
/// way's full key/value list; only `highway`, `oneway`, and `junction`
/// are consulted.
pub fn evaluate_way<'a, T>(mode: TravelMode, tags: T) -> Option<WaySpec>
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut highway = None;
    let mut oneway = None;
    let mut junction = None;
    for (k, v) in tags {
        match k {
            "highway" => highway = Some(v),
            "oneway" => oneway = Some(v),
            "junction" => junction = Some(v),
            _ => {}
        }
    }
    let highway = highway?;

    match mode {
        TravelMode::Drive => {
            let class = HighwayClass::from_tag(highway)?;
            let (forward, backward) = one_way_directions(class, highway, oneway, junction);
            Some(WaySpec {
                speed_mps: class.free_flow_mps(),
                forward,
                backward,
            })
        }
        TravelMode::Walk => {
            if !WALKABLE.contains(&highway) {
                return None;
            }
            // Pedestrians ignore one-way restrictions.
            Some(WaySpec {
                speed_mps: WALK_SPEED_MPS,
                forward: true,
                backward: true,
            })
        }
    }
}

fn one_way_directions(
    class: HighwayClass,
    highway: &str,
    oneway: Option<&str>,
    junction: Option<&str>,
) -> (bool, bool) {
    match oneway {
        Some("yes" | "true" | "1") => (true, false),
        Some("-1" | "reverse") => (false, true),
        Some("no" | "false" | "0") => (true, true),
        // Implied one-way: motorways, ramps, and roundabouts.
        _ if class == HighwayClass::Motorway
            || highway.ends_with("_link")
            || matches!(junction, Some("roundabout" | "circular")) =>
        {
            (true, false)
        }
        _ => (true, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_keeps_listed_classes_only() {
        assert!(evaluate_way(TravelMode::Drive, [("highway", "primary")]).is_some());
        assert!(evaluate_way(TravelMode::Drive, [("highway", "footway")]).is_none());
        assert!(evaluate_way(TravelMode::Drive, [("building", "yes")]).is_none());
    }

    #[test]
    fn explicit_oneway_beats_implication() {
        let spec = evaluate_way(
            TravelMode::Drive,
            [("highway", "motorway"), ("oneway", "no")],
        )
        .unwrap();
        assert!(spec.forward && spec.backward);

        let spec = evaluate_way(TravelMode::Drive, [("highway", "motorway")]).unwrap();
        assert!(spec.forward && !spec.backward);

        let spec = evaluate_way(
            TravelMode::Drive,
            [("highway", "residential"), ("oneway", "-1")],
        )
        .unwrap();
        assert!(!spec.forward && spec.backward);
    }

    #[test]
    fn roundabouts_are_one_way() {
        let spec = evaluate_way(
            TravelMode::Drive,
            [("highway", "tertiary"), ("junction", "roundabout")],
        )
        .unwrap();
        assert!(spec.forward && !spec.backward);
    }

    #[test]
    fn walk_is_bidirectional_at_constant_speed() {
        let spec = evaluate_way(
            TravelMode::Walk,
            [("highway", "primary"), ("oneway", "yes")],
        )
        .unwrap();
        assert!(spec.forward && spec.backward);
        assert!((spec.speed_mps - WALK_SPEED_MPS).abs() < f64::EPSILON);

        assert!(evaluate_way(TravelMode::Walk, [("highway", "motorway")]).is_none());
    }

    #[test]
    fn ramps_inherit_their_class_speed() {
        let ramp = evaluate_way(TravelMode::Drive, [("highway", "primary_link")]).unwrap();
        let road = evaluate_way(TravelMode::Drive, [("highway", "primary")]).unwrap();
        assert!((ramp.speed_mps - road.speed_mps).abs() < f64::EPSILON);
        // Links are implied one-way.
        assert!(ramp.forward && !ramp.backward);
    }
}
