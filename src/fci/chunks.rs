//! Mapping of lon/lat bounding boxes onto the body chunks of the MTG/FCI full disk.
//!
//! The FCI L1c full disk is delivered as 40 horizontal stripes ("chunks") of equal
//! line count, numbered from the south. Which chunks hold a given area follows from
//! the line number that area projects to in the geostationary view of the satellite.
use crate::bbox::BoundingBox;

/// WGS84 equatorial radius (m)
const EQUATORIAL_RADIUS: f64 = 6_378_137.0;
/// Polar radius used by the FCI grid definition (m)
const POLAR_RADIUS: f64 = 6_356_752.314_14;
/// Distance of the satellite from the Earth's centre (m)
const SATELLITE_DISTANCE: f64 = 35_786_400.0 + EQUATORIAL_RADIUS;
/// Sub-satellite longitude of MTG-I1 (degrees)
const SUB_SATELLITE_LON: f64 = 0.0;

/// Lines of the 2 km FDHSI grid
const GRID_LINES: f64 = 5568.0;
/// Angular line step of the 2 km grid (rad)
const LINE_STEP: f64 = 5.588_715_260_316_07e-5;

pub const CHUNK_COUNT: u32 = 40;

/// Samples per bbox edge when probing which chunks it touches.
const SAMPLES_PER_EDGE: usize = 32;

/// Return the sorted ids of the chunks covering `bbox`. Parts of the box the
/// satellite cannot see are ignored; an entirely invisible box gives an empty list.
pub fn chunks_for_bbox(bbox: &BoundingBox) -> Vec<u32> {
    let n = SAMPLES_PER_EDGE as f64;
    let touched = (0..=SAMPLES_PER_EDGE)
        .flat_map(|i| (0..=SAMPLES_PER_EDGE).map(move |j| (i, j)))
        .filter_map(|(i, j)| {
            let lon = bbox.west + (bbox.east - bbox.west) * i as f64 / n;
            let lat = bbox.south + (bbox.north - bbox.south) * j as f64 / n;
            grid_line(lon, lat).map(chunk_for_line)
        });

    let (min, max) = touched.fold((u32::MAX, 0), |(min, max), c| (min.min(c), max.max(c)));
    if min > max {
        return vec![];
    }
    (min..=max).collect()
}

/// Fractional grid line (counted from the southern edge of the disk) that a
/// lon/lat point projects to, or `None` if it is not visible from the satellite.
pub fn grid_line(lon: f64, lat: f64) -> Option<f64> {
    let y = scan_angle(lon, lat)?;
    Some(y / LINE_STEP + GRID_LINES / 2.0)
}

pub fn chunk_for_line(line: f64) -> u32 {
    let lines_per_chunk = GRID_LINES / CHUNK_COUNT as f64;
    let chunk = (line / lines_per_chunk).floor() as i64 + 1;
    chunk.clamp(1, CHUNK_COUNT as i64) as u32
}

/// North/south scan angle (rad) of a point in the geostationary view, positive north.
fn scan_angle(lon: f64, lat: f64) -> Option<f64> {
    let a2 = EQUATORIAL_RADIUS * EQUATORIAL_RADIUS;
    let b2 = POLAR_RADIUS * POLAR_RADIUS;

    let lat = lat.to_radians();
    let dlon = (lon - SUB_SATELLITE_LON).to_radians();

    // geocentric latitude and radius on the ellipsoid
    let c_lat = (b2 / a2 * lat.tan()).atan();
    let e2 = 1.0 - b2 / a2;
    let r_l = POLAR_RADIUS / (1.0 - e2 * c_lat.cos().powi(2)).sqrt();

    let px = r_l * c_lat.cos() * dlon.cos();
    let py = r_l * c_lat.cos() * dlon.sin();
    let pz = r_l * c_lat.sin();

    // line of sight must hit the surface from outside
    let facing = (px - SATELLITE_DISTANCE) * px / a2 + py * py / a2 + pz * pz / b2;
    if facing >= 0.0 {
        return None;
    }

    let r1 = SATELLITE_DISTANCE - px;
    let rn = (r1 * r1 + py * py + pz * pz).sqrt();
    Some((pz / rn).asin())
}
