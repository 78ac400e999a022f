//! Geocoding outcome for a single address.

/// WGS84 coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether the pair lies inside the WGS84 value range
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<Coordinate> for geo_types::Point<f64> {
    fn from(c: Coordinate) -> Self {
        geo_types::Point::new(c.longitude, c.latitude)
    }
}

/// Resolution status of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Service returned a coordinate
    Resolved,
    /// Service was reached but had no match (or the address was empty)
    NotFound,
    /// The call failed: network, HTTP status, quota or parse error
    ServiceError,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Resolved => "resolved",
            Status::NotFound => "not_found",
            Status::ServiceError => "service_error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input address together with what the geocoder made of it.
///
/// Coordinates are present exactly when the status is [`Status::Resolved`];
/// the constructors are the only way to build a record.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    address: String,
    coordinate: Option<Coordinate>,
    status: Status,
    detail: Option<String>,
}

impl AddressRecord {
    pub fn resolved(address: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            address: address.into(),
            coordinate: Some(coordinate),
            status: Status::Resolved,
            detail: None,
        }
    }

    pub fn not_found(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            coordinate: None,
            status: Status::NotFound,
            detail: None,
        }
    }

    pub fn service_error(address: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            coordinate: None,
            status: Status::ServiceError,
            detail: Some(detail.into()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.coordinate
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinate.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinate.map(|c| c.longitude)
    }

    /// Error message of a failed call, if any
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.status == Status::Resolved
    }
}
