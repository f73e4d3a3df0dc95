use model::Coord;
use serde::{Deserialize, Serialize};

// conversion factor from decimal degrees to meters (on earth)
pub const DECDEG_PER_METER: f64 = 1.0 / 111_000.0;

pub fn dd2m(dd: f64) -> f64 {
    dd / DECDEG_PER_METER
}

pub fn m2dd(m: f64) -> f64 {
    m * DECDEG_PER_METER
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Colinear,
    Clockwise,
    CounterClockwise,
}

/// Orientation of the ordered triplet (p, q, r), taken from the sign of the
/// cross product of (q - p) and (r - q).
pub fn orientation(p: Coord, q: Coord, r: Coord) -> Orientation {
    let val = (q.lon - p.lon) * (r.lat - q.lat) - (q.lat - p.lat) * (r.lon - q.lon);
    if val == 0.0 {
        Orientation::Colinear
    } else if val > 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::CounterClockwise
    }
}

/// For three colinear points, whether q lies on segment pr.
pub fn on_segment(p: Coord, q: Coord, r: Coord) -> bool {
    q.lat <= p.lat.max(r.lat)
        && q.lat >= p.lat.min(r.lat)
        && q.lon <= p.lon.max(r.lon)
        && q.lon >= p.lon.min(r.lon)
}

/// True if segment p1q1 intersects segment p2q2. Touching counts.
pub fn do_intersect(p1: Coord, q1: Coord, p2: Coord, q2: Coord) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    // colinear special cases
    (o1 == Orientation::Colinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Colinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Colinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Colinear && on_segment(p2, q1, q2))
}

/// Short segment laid across the track path. A sample moving from c1 to c2
/// "crossed" the gate when the two segments intersect.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DetectionGate {
    pub a: Coord,
    pub b: Coord,
}

impl DetectionGate {
    pub fn new(a: Coord, b: Coord) -> Self {
        Self { a, b }
    }

    pub fn detect(&self, c1: Coord, c2: Coord) -> bool {
        do_intersect(self.a, self.b, c1, c2)
    }

    /// Whether `p` lies on the gate itself.
    pub fn touches(&self, p: Coord) -> bool {
        orientation(self.a, self.b, p) == Orientation::Colinear && on_segment(self.a, p, self.b)
    }

    /// Gate normal to the segment pa..pb, centred on `center`.
    pub fn across(pa: Coord, pb: Coord, center: Coord, width_m: f64) -> Self {
        let half_dd = m2dd(width_m) / 2.0;
        let (a, b) = if pa.lat == pb.lat {
            // path runs along longitude; gate spans latitude
            (half_dd, 0.0)
        } else if pa.lon == pb.lon {
            // path runs along latitude; gate spans longitude
            (0.0, half_dd)
        } else {
            let path_slope = (pb.lat - pa.lat) / (pb.lon - pa.lon);
            let norm_slope = -1.0 / path_slope;
            // a^2 + b^2 = c^2 with norm_slope = a / b
            let b = ((half_dd * half_dd) / (norm_slope * norm_slope + 1.0)).sqrt();
            (norm_slope * b, b)
        };
        let half = Coord::new(a, b);
        Self { a: center + half, b: center - half }
    }
}
