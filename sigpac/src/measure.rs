//! Mesures géométriques sur les parcelles
//!
//! Surface géodésique en hectares et centroïde, sur des polygones en
//! coordonnées WGS84. Un polygone dégénéré (moins de 3 sommets distincts)
//! donne `None`, jamais une erreur : « pas encore de surface mesurable »
//! est un état intermédiaire normal pendant qu'une forme est dessinée.

use geo::{Centroid, Coord, GeodesicArea, LineString, Point, Polygon};

const M2_PER_HECTARE: f64 = 10_000.0;

/// Surface d'un polygone en hectares (calcul géodésique, non signé).
///
/// Déterministe et non négative. Retourne `None` pour un polygone dégénéré.
pub fn area_hectares(polygon: &Polygon<f64>) -> Option<f64> {
    if distinct_vertices(polygon.exterior()) < 3 {
        return None;
    }
    Some(polygon.geodesic_area_unsigned() / M2_PER_HECTARE)
}

/// Centroïde d'un polygone (x = longitude, y = latitude)
pub fn centroid(polygon: &Polygon<f64>) -> Option<Point<f64>> {
    if distinct_vertices(polygon.exterior()) < 3 {
        return None;
    }
    polygon.centroid()
}

/// Construit un polygone depuis des sommets (longitude, latitude).
///
/// L'anneau est fermé automatiquement par `geo`.
pub fn polygon_from_vertices(vertices: &[(f64, f64)]) -> Polygon<f64> {
    Polygon::new(LineString::from(vertices.to_vec()), vec![])
}

/// Compte les sommets distincts d'un anneau, fermeture ignorée
fn distinct_vertices(ring: &LineString<f64>) -> usize {
    let coords = &ring.0;
    let len = if coords.len() > 1 && coords.first() == coords.last() {
        coords.len() - 1
    } else {
        coords.len()
    };

    let mut seen: Vec<Coord<f64>> = Vec::with_capacity(len);
    for coord in &coords[..len] {
        if !seen.contains(coord) {
            seen.push(*coord);
        }
    }
    seen.len()
}
