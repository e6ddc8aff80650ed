//! Frontière de persistance des parcelles
//!
//! Le cœur transmet des instantanés complets au magasin mais n'en possède
//! pas l'implémentation (PostGIS dans `sigpac-pg`, autre chose ailleurs).

use async_trait::async_trait;
use geo::{Point, Polygon};

use crate::error::SigpacError;
use crate::reconciler::{ActiveParcel, ParcelSource};
use crate::types::CadastralAttributes;

/// Identifiant d'une parcelle sauvegardée
pub type ParcelId = i64;

/// Parcelle prête à être persistée, avec son nom utilisateur
#[derive(Debug, Clone, PartialEq)]
pub struct NewParcel {
    pub name: String,
    pub attributes: CadastralAttributes,
    pub area_hectares: Option<f64>,
    pub geometry: Option<Polygon<f64>>,
    /// Centroïde dénormalisé (x = longitude, y = latitude), pour les
    /// consommateurs météo en aval
    pub centroid: Option<Point<f64>>,
    pub source: Option<ParcelSource>,
}

impl NewParcel {
    /// Construit l'enregistrement à persister depuis l'instantané actif
    pub fn from_active(name: &str, active: &ActiveParcel) -> Self {
        Self {
            name: name.to_string(),
            attributes: active.attributes.clone(),
            area_hectares: active.area_hectares,
            geometry: active.geometry.clone(),
            centroid: active.centroid(),
            source: active.source,
        }
    }
}

/// Résultat d'une sauvegarde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nouvelle parcelle insérée
    Inserted(ParcelId),
    /// Une parcelle de géométrie identique existait déjà ; son identifiant
    /// est renvoyé sans insertion
    Duplicate(ParcelId),
}

impl SaveOutcome {
    pub fn id(self) -> ParcelId {
        match self {
            SaveOutcome::Inserted(id) | SaveOutcome::Duplicate(id) => id,
        }
    }
}

/// Parcelle sauvegardée, relue pour affichage
#[derive(Debug, Clone, PartialEq)]
pub struct SavedParcel {
    pub id: ParcelId,
    pub name: String,
    pub attributes: CadastralAttributes,
    pub area_hectares: Option<f64>,
    pub source: Option<ParcelSource>,
    pub created_at: Option<String>,
}

/// Magasin de parcelles sauvegardées.
///
/// Le cœur appelle `save` une seule fois par demande utilisateur et ne
/// retente pas : un échec est remonté tel quel à l'appelant.
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// Persiste une parcelle ; détecte les doublons de géométrie
    async fn save(&self, parcel: &NewParcel) -> Result<SaveOutcome, SigpacError>;

    /// Liste les parcelles sauvegardées, la plus récente en premier
    async fn list(&self) -> Result<Vec<SavedParcel>, SigpacError>;

    /// Relit une parcelle par identifiant
    async fn get(&self, id: ParcelId) -> Result<Option<SavedParcel>, SigpacError>;

    /// Supprime une parcelle ; vrai si une ligne a été supprimée
    async fn delete(&self, id: ParcelId) -> Result<bool, SigpacError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::polygon_from_vertices;

    #[test]
    fn test_new_parcel_from_active() {
        let polygon = polygon_from_vertices(&[
            (-4.780, 37.880),
            (-4.770, 37.880),
            (-4.770, 37.885),
            (-4.780, 37.885),
        ]);
        let active = ActiveParcel {
            geometry: Some(polygon.clone()),
            attributes: CadastralAttributes {
                provincia: Some("14".into()),
                ..Default::default()
            },
            area_hectares: Some(48.8),
            source: Some(ParcelSource::Draw),
            last_lookup: None,
        };

        let record = NewParcel::from_active("Olivar norte", &active);
        assert_eq!(record.name, "Olivar norte");
        assert_eq!(record.geometry, Some(polygon));
        assert_eq!(record.area_hectares, Some(48.8));
        assert_eq!(record.source, Some(ParcelSource::Draw));
        let centroid = record.centroid.unwrap();
        assert!((centroid.x() - -4.775).abs() < 1e-6);
    }

    #[test]
    fn test_save_outcome_id() {
        assert_eq!(SaveOutcome::Inserted(7).id(), 7);
        assert_eq!(SaveOutcome::Duplicate(3).id(), 3);
    }
}
