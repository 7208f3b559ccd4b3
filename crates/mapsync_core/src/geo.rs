//! Geographic value types shared by every binding

use serde::{Deserialize, Serialize};

/// A longitude/latitude pair in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// GeoJSON position array (`[lng, lat]`)
    pub fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// Shift this coordinate by whole turns so it sits on the same side of the
    /// antimeridian as `cursor_lng`
    ///
    /// Engines that render copies of the world report feature coordinates from the
    /// canonical copy, while the cursor may be over a neighbouring copy. Popups and
    /// callbacks anchored at the raw coordinate would then jump across the map.
    ///
    /// ```
    /// use mapsync_core::geo::LngLat;
    ///
    /// let corrected = LngLat::new(-179.0, 10.0).wrapped_near(179.0);
    /// assert_eq!(corrected.lng, 181.0);
    /// ```
    ///
    /// Non-finite inputs are returned unchanged.
    pub fn wrapped_near(self, cursor_lng: f64) -> Self {
        let delta = cursor_lng - self.lng;
        if !delta.is_finite() || delta.abs() <= 180.0 {
            return self;
        }
        let lng = self.lng + 360.0 * (delta / 360.0).round();
        Self { lng, lat: self.lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<(f64, f64)> for LngLat {
    fn from((lng, lat): (f64, f64)) -> Self {
        Self { lng, lat }
    }
}

/// A position in screen pixels relative to the map canvas
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned geographic bounds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub south_west: LngLat,
    pub north_east: LngLat,
}

impl LngLatBounds {
    /// Bounds covering exactly one point
    pub fn from_point(point: LngLat) -> Self {
        Self {
            south_west: point,
            north_east: point,
        }
    }

    /// Grow the bounds to include `point`
    pub fn extend(&mut self, point: LngLat) {
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
    }

    /// Smallest bounds containing every point, or `None` for an empty path
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LngLat>) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bounds = Self::from_point(*iter.next()?);
        for point in iter {
            bounds.extend(*point);
        }
        Some(bounds)
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.south_west.lng + self.north_east.lng) / 2.0,
            (self.south_west.lat + self.north_east.lat) / 2.0,
        )
    }
}

/// Index of the path vertex closest to `cursor`, comparing after antimeridian
/// correction
pub fn nearest_vertex(path: &[LngLat], cursor: LngLat) -> Option<usize> {
    path.iter()
        .enumerate()
        .map(|(index, vertex)| {
            let wrapped = vertex.wrapped_near(cursor.lng);
            let dx = wrapped.lng - cursor.lng;
            let dy = wrapped.lat - cursor.lat;
            (index, dx * dx + dy * dy)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}
