use crate::models::job::RoutePoint;
use crate::models::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

const SAME_COUNTRY_FALLBACK_KM: f64 = 150.0;
const CROSS_COUNTRY_FALLBACK_KM: f64 = 600.0;
const SAME_CITY_FALLBACK_KM: f64 = 25.0;

/// City centres used when a route point carries no coordinates.
const KNOWN_CITIES: &[(&str, f64, f64)] = &[
    ("amsterdam", 52.3676, 4.9041),
    ("berlin", 52.5200, 13.4050),
    ("bratislava", 48.1486, 17.1077),
    ("brasov", 45.6427, 25.5887),
    ("brussels", 50.8503, 4.3517),
    ("bucharest", 44.4268, 26.1025),
    ("budapest", 47.4979, 19.0402),
    ("cluj-napoca", 46.7712, 23.6236),
    ("constanta", 44.1598, 28.6348),
    ("craiova", 44.3302, 23.7949),
    ("hamburg", 53.5511, 9.9937),
    ("iasi", 47.1585, 27.6014),
    ("london", 51.5074, -0.1278),
    ("madrid", 40.4168, -3.7038),
    ("milan", 45.4642, 9.1900),
    ("munich", 48.1351, 11.5820),
    ("paris", 48.8566, 2.3522),
    ("prague", 50.0755, 14.4378),
    ("sofia", 42.6977, 23.3219),
    ("timisoara", 45.7489, 21.2087),
    ("vienna", 48.2082, 16.3738),
    ("warsaw", 52.2297, 21.0122),
];

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn known_city(city: &str) -> Option<GeoPoint> {
    let needle = city.trim().to_lowercase();
    KNOWN_CITIES
        .iter()
        .find(|(name, _, _)| *name == needle)
        .map(|&(_, lat, lng)| GeoPoint { lat, lng })
}

/// Explicit coordinates first, then the city table.
pub fn resolve_point(point: &RoutePoint) -> Option<GeoPoint> {
    point.location.or_else(|| known_city(&point.city))
}

/// Road distance estimate between two route points. Never fails.
pub fn estimate_distance_km(origin: &RoutePoint, destination: &RoutePoint) -> f64 {
    if let (Some(a), Some(b)) = (resolve_point(origin), resolve_point(destination)) {
        return haversine_km(&a, &b);
    }

    let same_country = origin
        .country
        .trim()
        .eq_ignore_ascii_case(destination.country.trim());

    if !same_country {
        CROSS_COUNTRY_FALLBACK_KM
    } else if origin.city.trim().eq_ignore_ascii_case(destination.city.trim()) {
        SAME_CITY_FALLBACK_KM
    } else {
        SAME_COUNTRY_FALLBACK_KM
    }
}
