//! Hash de géométrie pour la déduplication des parcelles sauvegardées
//!
//! Le hash est normalisé pour être indépendant du sommet de départ des
//! anneaux : un même polygone dessiné en commençant ailleurs produit le
//! même hash, et donc un doublon détecté à la sauvegarde.

use blake3::Hasher;
use geo::{Coord, LineString, Polygon};

/// Calcule un hash stable d'un polygone WGS84
pub fn polygon_hash(polygon: &Polygon<f64>) -> [u8; 32] {
    let mut hasher = Hasher::new();

    hasher.update(b"EXT");
    hash_ring_normalized(&mut hasher, polygon.exterior());
    for interior in polygon.interiors() {
        hasher.update(b"INT");
        hash_ring_normalized(&mut hasher, interior);
    }

    *hasher.finalize().as_bytes()
}

/// Représentation hexadécimale d'un hash (logs, diagnostics)
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

/// Hash un anneau en le faisant commencer au sommet lexicographiquement le
/// plus petit (min x, puis min y) ; le point de fermeture est ignoré.
fn hash_ring_normalized(hasher: &mut Hasher, ring: &LineString<f64>) {
    let coords = &ring.0;
    let len = if coords.len() > 1 && coords.first() == coords.last() {
        coords.len() - 1
    } else {
        coords.len()
    };
    if len == 0 {
        return;
    }

    let min_idx = (0..len)
        .min_by(|&a, &b| {
            let ca = &coords[a];
            let cb = &coords[b];
            ca.x.partial_cmp(&cb.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ca.y.partial_cmp(&cb.y).unwrap_or(std::cmp::Ordering::Equal))
        })
        .unwrap_or(0);

    for i in 0..len {
        hash_coord(hasher, coords[(min_idx + i) % len]);
    }
}

/// Hash une coordonnée arrondie à 6 décimales (~10 cm) pour stabilité
fn hash_coord(hasher: &mut Hasher, coord: Coord<f64>) {
    let x = (coord.x * 1_000_000.0).round() as i64;
    let y = (coord.y * 1_000_000.0).round() as i64;
    hasher.update(&x.to_le_bytes());
    hasher.update(&y.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigpac::measure::polygon_from_vertices;

    #[test]
    fn test_same_polygon_same_hash() {
        let a = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let b = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(polygon_hash(&a), polygon_hash(&b));
    }

    #[test]
    fn test_start_vertex_does_not_matter() {
        let a = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let b = polygon_from_vertices(&[(1.0, 1.0), (0.0, 1.0), (0.0, 0.0), (1.0, 0.0)]);
        assert_eq!(polygon_hash(&a), polygon_hash(&b));
    }

    #[test]
    fn test_different_polygon_different_hash() {
        let a = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let b = polygon_from_vertices(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert_ne!(polygon_hash(&a), polygon_hash(&b));
    }

    #[test]
    fn test_hash_to_hex() {
        let polygon = polygon_from_vertices(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        let hash = polygon_hash(&polygon);
        assert_eq!(hash_to_hex(&hash).len(), 64);
    }
}
