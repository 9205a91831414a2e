//! Grid reference conversion (lat/lon ↔ MGRS)
//!
//! Pure WGS-84 transverse Mercator math for the dispatch panel, which
//! accepts and displays military grid references next to decimal
//! coordinates. Covers the UTM bands (80°S–84°N); polar UPS zones are
//! rejected.

use crate::error::{Error, Result};

const BAND_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";
const E100K_SETS: [&[u8]; 3] = [b"ABCDEFGH", b"JKLMNPQR", b"STUVWXYZ"];
const N100K_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUV";

// WGS-84
const A: f64 = 6_378_137.0;
const ECC2: f64 = 0.006_694_38;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING: f64 = 10_000_000.0;

/// Convert WGS-84 coordinates to an MGRS string.
///
/// `precision` is the number of digits per axis (1–5; 5 ⇒ one-metre
/// squares). Output is compact, e.g. `18SUJ2282107082`.
pub fn latlon_to_mgrs(lat: f64, lon: f64, precision: usize) -> Result<String> {
    if !(1..=5).contains(&precision) {
        return Err(Error::Validation(format!(
            "precision {precision} out of range 1-5"
        )));
    }
    if !(-80.0..=84.0).contains(&lat) {
        return Err(Error::Validation(format!(
            "latitude {lat} outside grid bands (80S-84N)"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::Validation(format!("longitude {lon} out of range")));
    }

    let band = band_letter(lat);
    let (zone, easting, northing) = latlon_to_utm(lat, lon);

    let set = ((zone - 1) % 3) as usize;
    let column = (easting / 100_000.0).floor() as usize;
    let e_letter = *E100K_SETS[set]
        .get(column.wrapping_sub(1))
        .ok_or_else(|| Error::Internal(format!("easting {easting} outside zone {zone}")))?
        as char;

    let mut row = ((northing.rem_euclid(2_000_000.0)) / 100_000.0).floor() as usize;
    if zone % 2 == 0 {
        row = (row + 5) % 20;
    }
    let n_letter = N100K_LETTERS[row] as char;

    let scale = 10_f64.powi(5 - precision as i32);
    let e_digits = (easting.rem_euclid(100_000.0) / scale).floor() as u32;
    let n_digits = (northing.rem_euclid(100_000.0) / scale).floor() as u32;

    Ok(format!(
        "{zone}{band}{e_letter}{n_letter}{e_digits:0width$}{n_digits:0width$}",
        width = precision
    ))
}

/// Parse an MGRS string back to WGS-84 coordinates (center of the square).
///
/// Tolerates lowercase and embedded spaces; requires an even number of
/// digits (up to 5 per axis).
pub fn mgrs_to_latlon(reference: &str) -> Result<(f64, f64)> {
    let compact: String = reference
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let zone_len = compact.chars().take_while(|c| c.is_ascii_digit()).count();
    if !(1..=2).contains(&zone_len) {
        return Err(Error::Parse(format!("bad grid zone in {reference:?}")));
    }
    let zone: u32 = compact[..zone_len]
        .parse()
        .map_err(|_| Error::Parse(format!("bad grid zone in {reference:?}")))?;
    if !(1..=60).contains(&zone) {
        return Err(Error::Parse(format!("grid zone {zone} out of range")));
    }

    let mut letters = compact[zone_len..].chars();
    let band = letters
        .next()
        .ok_or_else(|| Error::Parse("missing band letter".to_string()))?;
    if !band.is_ascii() || !BAND_LETTERS.contains(&(band as u8)) {
        return Err(Error::Parse(format!("bad band letter {band:?}")));
    }
    let e_letter = letters
        .next()
        .ok_or_else(|| Error::Parse("missing 100km square letters".to_string()))?;
    let n_letter = letters
        .next()
        .ok_or_else(|| Error::Parse("missing 100km square letters".to_string()))?;

    let digits: String = letters.collect();
    if digits.len() % 2 != 0 || digits.len() > 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Parse(format!("bad digit block in {reference:?}")));
    }
    let precision = digits.len() / 2;
    let scale = 10_f64.powi(5 - precision as i32);

    let set = ((zone - 1) % 3) as usize;
    let column = E100K_SETS[set]
        .iter()
        .position(|&c| c as char == e_letter)
        .ok_or_else(|| Error::Parse(format!("square letter {e_letter:?} invalid for zone {zone}")))?;
    let e100k = (column as f64 + 1.0) * 100_000.0;

    let mut row = N100K_LETTERS
        .iter()
        .position(|&c| c as char == n_letter)
        .ok_or_else(|| Error::Parse(format!("square letter {n_letter:?} invalid")))?;
    if zone % 2 == 0 {
        row = (row + 20 - 5) % 20;
    }
    let n100k = row as f64 * 100_000.0;

    let (e_digits, n_digits) = if precision > 0 {
        let half = digits.len() / 2;
        let e: f64 = digits[..half].parse::<u32>().unwrap_or(0) as f64;
        let n: f64 = digits[half..].parse::<u32>().unwrap_or(0) as f64;
        (e * scale, n * scale)
    } else {
        (0.0, 0.0)
    };
    let center = scale / 2.0;

    let easting = e100k + e_digits + center;
    let mut northing = n100k + n_digits + center;

    // 100km rows repeat every 2,000km; pick the repetition that lands in
    // the latitude band
    let min_northing = band_min_northing(band)?;
    while northing < min_northing {
        northing += 2_000_000.0;
    }

    let southern = band < 'N';
    Ok(utm_to_latlon(zone, easting, northing, southern))
}

/// Latitude band letter (C–X, skipping I and O)
fn band_letter(lat: f64) -> char {
    let index = (((lat + 80.0) / 8.0).floor() as isize).clamp(0, 19) as usize;
    BAND_LETTERS[index] as char
}

/// Lowest UTM northing (false-northing space) occurring in each band
fn band_min_northing(band: char) -> Result<f64> {
    let northing = match band {
        'C' => 1_100_000.0,
        'D' => 2_000_000.0,
        'E' => 2_800_000.0,
        'F' => 3_700_000.0,
        'G' => 4_600_000.0,
        'H' => 5_500_000.0,
        'J' => 6_400_000.0,
        'K' => 7_300_000.0,
        'L' => 8_200_000.0,
        'M' => 9_100_000.0,
        'N' => 0.0,
        'P' => 800_000.0,
        'Q' => 1_700_000.0,
        'R' => 2_600_000.0,
        'S' => 3_500_000.0,
        'T' => 4_400_000.0,
        'U' => 5_300_000.0,
        'V' => 6_200_000.0,
        'W' => 7_000_000.0,
        'X' => 7_900_000.0,
        _ => return Err(Error::Parse(format!("bad band letter {band:?}"))),
    };
    Ok(northing)
}

/// Forward transverse Mercator projection into the point's own zone
fn latlon_to_utm(lat: f64, lon: f64) -> (u32, f64, f64) {
    let zone = ((((lon + 180.0) / 6.0).floor() as i64) + 1).clamp(1, 60) as u32;
    let lon_origin = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let phi = lat.to_radians();
    let ep2 = ECC2 / (1.0 - ECC2);
    let n = A / (1.0 - ECC2 * phi.sin() * phi.sin()).sqrt();
    let t = phi.tan() * phi.tan();
    let c = ep2 * phi.cos() * phi.cos();
    let a_cap = phi.cos() * (lon.to_radians() - lon_origin);

    let m = A
        * ((1.0 - ECC2 / 4.0 - 3.0 * ECC2 * ECC2 / 64.0 - 5.0 * ECC2 * ECC2 * ECC2 / 256.0) * phi
            - (3.0 * ECC2 / 8.0 + 3.0 * ECC2 * ECC2 / 32.0 + 45.0 * ECC2 * ECC2 * ECC2 / 1024.0)
                * (2.0 * phi).sin()
            + (15.0 * ECC2 * ECC2 / 256.0 + 45.0 * ECC2 * ECC2 * ECC2 / 1024.0)
                * (4.0 * phi).sin()
            - (35.0 * ECC2 * ECC2 * ECC2 / 3072.0) * (6.0 * phi).sin());

    let easting = K0
        * n
        * (a_cap
            + (1.0 - t + c) * a_cap.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a_cap.powi(5) / 120.0)
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * phi.tan()
            * (a_cap * a_cap / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a_cap.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a_cap.powi(6) / 720.0));
    if lat < 0.0 {
        northing += FALSE_NORTHING;
    }

    (zone, easting, northing)
}

/// Inverse transverse Mercator back to geographic coordinates
fn utm_to_latlon(zone: u32, easting: f64, northing: f64, southern: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if southern {
        northing - FALSE_NORTHING
    } else {
        northing
    };

    let ep2 = ECC2 / (1.0 - ECC2);
    let e1 = (1.0 - (1.0 - ECC2).sqrt()) / (1.0 + (1.0 - ECC2).sqrt());

    let m = y / K0;
    let mu = m
        / (A * (1.0 - ECC2 / 4.0 - 3.0 * ECC2 * ECC2 / 64.0 - 5.0 * ECC2 * ECC2 * ECC2 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let n1 = A / (1.0 - ECC2 * phi1.sin() * phi1.sin()).sqrt();
    let t1 = phi1.tan() * phi1.tan();
    let c1 = ep2 * phi1.cos() * phi1.cos();
    let r1 = A * (1.0 - ECC2) / (1.0 - ECC2 * phi1.sin() * phi1.sin()).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * phi1.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon_origin = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
    let lon = lon_origin
        + ((d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / phi1.cos())
        .to_degrees();

    (lat.to_degrees(), lon)
}
