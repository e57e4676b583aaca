//! Axis-aligned bounding envelopes and the reference frames they live in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Equatorial radius used by the spherical Web Mercator projection.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of the Web Mercator projection, in degrees.
pub const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_78;

/// An axis-aligned bounding box. Edges are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Envelope {
    /// Create an envelope, rejecting NaN coordinates and inverted ranges.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, TypeError> {
        if [min_x, min_y, max_x, max_y].iter().any(|v| v.is_nan()) {
            return Err(TypeError::InvalidArgument("envelope coordinate is NaN".into()));
        }
        if min_x > max_x || min_y > max_y {
            return Err(TypeError::InvalidArgument(format!(
                "inverted envelope: ({min_x}, {min_y}) .. ({max_x}, {max_y})"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// A degenerate envelope covering a single point.
    pub fn point(x: f64, y: f64) -> Result<Self, TypeError> {
        Self::new(x, y, x, y)
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns `true` if the two envelopes share at least one point.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Returns `true` if `other` lies entirely inside this envelope.
    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// Grow this envelope so it also covers `other`.
    pub fn expand_to_include(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// The smallest envelope covering both inputs.
    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut out = *self;
        out.expand_to_include(other);
        out
    }

    /// Union of a sequence of optional envelopes.
    ///
    /// Returns `None` if the sequence is empty or if any element is `None`:
    /// an entry without spatial information makes the aggregate unknown.
    pub fn union_all<'a, I>(envelopes: I) -> Option<Envelope>
    where
        I: IntoIterator<Item = Option<&'a Envelope>>,
    {
        let mut acc: Option<Envelope> = None;
        for env in envelopes {
            let env = env?;
            match acc.as_mut() {
                Some(a) => a.expand_to_include(env),
                None => acc = Some(*env),
            }
        }
        acc
    }

    /// Reproject this envelope from one reference frame into another.
    ///
    /// Returns `None` when no transform between the two frames is known.
    pub fn transform(&self, from: &Crs, to: &Crs) -> Option<Envelope> {
        if from == to {
            return Some(*self);
        }
        match (from, to) {
            (Crs::Wgs84, Crs::WebMercator) => {
                let (x0, y0) = lonlat_to_mercator(self.min_x, self.min_y);
                let (x1, y1) = lonlat_to_mercator(self.max_x, self.max_y);
                Some(Envelope {
                    min_x: x0,
                    min_y: y0,
                    max_x: x1,
                    max_y: y1,
                })
            }
            (Crs::WebMercator, Crs::Wgs84) => {
                let (x0, y0) = mercator_to_lonlat(self.min_x, self.min_y);
                let (x1, y1) = mercator_to_lonlat(self.max_x, self.max_y);
                Some(Envelope {
                    min_x: x0,
                    min_y: y0,
                    max_x: x1,
                    max_y: y1,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lon = lon.clamp(-180.0, 180.0);
    let lat = lat.clamp(-MERCATOR_MAX_LATITUDE, MERCATOR_MAX_LATITUDE);
    let x = lon.to_radians() * MERCATOR_RADIUS;
    let y = (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln() * MERCATOR_RADIUS;
    (x, y)
}

fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon.clamp(-180.0, 180.0), lat)
}

/// Coordinate reference frame of spatial data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic longitude/latitude, EPSG:4326.
    Wgs84,
    /// Spherical Web Mercator, EPSG:3857.
    WebMercator,
    /// Any other frame, identified by its authority code.
    Other(String),
}

impl Crs {
    /// Parse an authority code such as `"EPSG:4326"`.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" => Self::Wgs84,
            "EPSG:3857" | "EPSG:900913" => Self::WebMercator,
            _ => Self::Other(code.trim().to_string()),
        }
    }

    /// The authority code of this frame.
    pub fn code(&self) -> &str {
        match self {
            Self::Wgs84 => "EPSG:4326",
            Self::WebMercator => "EPSG:3857",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
