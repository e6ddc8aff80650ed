//! Résolution d'attributs cadastraux via le service de consultation
//!
//! `CadastralLookup` est la frontière avec le service distant ; le
//! résolveur normalise ses formes de réponse hétérogènes (objet plat,
//! enveloppe `properties`, clés sous plusieurs alias, codes numériques ou
//! chaînes) en un enregistrement d'attributs unique.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::LookupError;
use crate::hierarchy::HierarchyLevel;
use crate::types::{BoundingBox, CadastralAttributes, HierarchyPath, LevelOption};

/// Demi-largeur de la boîte de requête ponctuelle, en degrés.
///
/// Valeur fixe alignée sur la résolution du service de consultation.
pub const POINT_EPSILON_DEG: f64 = 0.0005;

/// Frontière d'accès au service cadastral distant.
///
/// Une liste vide est une réponse valide pour chacune des opérations ; le
/// transport est supposé renvoyer du JSON bien formé ou échouer avec une
/// `LookupError`.
#[async_trait]
pub trait CadastralLookup: Send + Sync {
    /// Options sélectionnables d'un niveau, pour des codes ancêtres donnés
    async fn level_options(
        &self,
        level: HierarchyLevel,
        ancestors: &[String],
    ) -> Result<Vec<LevelOption>, LookupError>;

    /// Enregistrements d'attributs du niveau le plus profond d'un chemin
    async fn features_by_path(&self, path: &HierarchyPath) -> Result<Vec<Value>, LookupError>;

    /// Enregistrements d'attributs des features intersectant une boîte
    async fn features_in(&self, bbox: &BoundingBox) -> Result<Vec<Value>, LookupError>;
}

/// Résolveur d'attributs cadastraux.
///
/// Idempotent et sans effet de bord : deux appels identiques renvoient le
/// même résultat tant que les données du service ne changent pas.
#[derive(Debug, Clone)]
pub struct CadastralResolver<L> {
    lookup: L,
    epsilon: f64,
}

impl<L: CadastralLookup> CadastralResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            epsilon: POINT_EPSILON_DEG,
        }
    }

    /// Résolveur avec une demi-largeur de boîte ponctuelle spécifique
    pub fn with_epsilon(lookup: L, epsilon: f64) -> Self {
        Self { lookup, epsilon }
    }

    /// Accès au service sous-jacent (chargement d'options notamment)
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Résout les attributs du niveau le plus profond d'un chemin.
    ///
    /// Zéro feature est un résultat valide : tous les champs restent non
    /// résolus. Seuls les attributs présents dans la réponse sont remplis.
    pub async fn resolve_by_hierarchy(
        &self,
        path: &HierarchyPath,
    ) -> Result<CadastralAttributes, LookupError> {
        let features = self.lookup.features_by_path(path).await?;
        Ok(normalize_first(&features))
    }

    /// Résout les attributs de la plus petite feature englobant un point.
    ///
    /// Interroge une boîte fixe de ± epsilon degrés centrée sur le point ;
    /// zéro ou une feature est attendue, s'il y en a plus la première est
    /// utilisée.
    pub async fn resolve_by_point(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<CadastralAttributes, LookupError> {
        let bbox = BoundingBox::around(lat, lng, self.epsilon);
        let features = self.lookup.features_in(&bbox).await?;
        if features.len() > 1 {
            debug!(count = features.len(), "Multiple features at point, using the first");
        }
        Ok(normalize_first(&features))
    }
}

/// Alias de clés acceptés pour un niveau (les réponses varient selon la
/// couche interrogée)
fn key_aliases(level: HierarchyLevel) -> &'static [&'static str] {
    match level {
        HierarchyLevel::Provincia => &["provincia", "cod_provincia", "provincia_nombre"],
        HierarchyLevel::Municipio => &["municipio", "cod_municipio", "municipio_nombre"],
        HierarchyLevel::Poligono => &["poligono", "cod_poligono"],
        HierarchyLevel::Parcela => &["parcela", "cod_parcela", "parcela_num"],
        HierarchyLevel::Recinto => &["recinto", "cod_recinto"],
    }
}

/// Normalise le premier enregistrement d'une liste de features
fn normalize_first(features: &[Value]) -> CadastralAttributes {
    features
        .first()
        .map(normalize_record)
        .unwrap_or_default()
}

/// Normalise un enregistrement hétérogène en attributs cadastraux.
///
/// Accepte un objet plat ou un objet GeoJSON-like avec `properties` ; un
/// champ introuvable reste `None` (non résolu, pas une erreur).
pub fn normalize_record(record: &Value) -> CadastralAttributes {
    let object = record
        .get("properties")
        .and_then(Value::as_object)
        .or_else(|| record.as_object());

    let mut attributes = CadastralAttributes::default();
    if let Some(map) = object {
        for level in HierarchyLevel::ALL {
            for key in key_aliases(level) {
                if let Some(value) = map.get(*key).and_then(value_to_string) {
                    attributes.set(level, value);
                    break;
                }
            }
        }
    }
    attributes
}

/// Convertit une valeur JSON scalaire en chaîne (codes numériques inclus)
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Service en mémoire renvoyant des réponses fixes
    struct FixedLookup {
        features: Vec<Value>,
        calls: AtomicUsize,
    }

    impl FixedLookup {
        fn new(features: Vec<Value>) -> Self {
            Self {
                features,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CadastralLookup for FixedLookup {
        async fn level_options(
            &self,
            _level: HierarchyLevel,
            _ancestors: &[String],
        ) -> Result<Vec<LevelOption>, LookupError> {
            Ok(vec![])
        }

        async fn features_by_path(
            &self,
            _path: &HierarchyPath,
        ) -> Result<Vec<Value>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.features.clone())
        }

        async fn features_in(&self, _bbox: &BoundingBox) -> Result<Vec<Value>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.features.clone())
        }
    }

    #[test]
    fn test_normalize_flat_record() {
        let attributes = normalize_record(&json!({
            "provincia": 14,
            "municipio": "21",
            "poligono": 3,
            "parcela": 12,
            "recinto": 1
        }));
        assert_eq!(attributes.provincia.as_deref(), Some("14"));
        assert_eq!(attributes.municipio.as_deref(), Some("21"));
        assert_eq!(attributes.poligono.as_deref(), Some("3"));
        assert_eq!(attributes.parcela.as_deref(), Some("12"));
        assert_eq!(attributes.recinto.as_deref(), Some("1"));
    }

    #[test]
    fn test_normalize_properties_wrapper_and_aliases() {
        let attributes = normalize_record(&json!({
            "type": "Feature",
            "properties": {
                "cod_provincia": "14",
                "municipio_nombre": "Córdoba",
                "parcela_num": 12
            }
        }));
        assert_eq!(attributes.provincia.as_deref(), Some("14"));
        assert_eq!(attributes.municipio.as_deref(), Some("Córdoba"));
        assert_eq!(attributes.parcela.as_deref(), Some("12"));
        assert_eq!(attributes.poligono, None);
        assert_eq!(attributes.recinto, None);
    }

    #[test]
    fn test_normalize_ignores_empty_strings_and_nulls() {
        let attributes = normalize_record(&json!({
            "provincia": "",
            "municipio": null,
            "poligono": "3"
        }));
        assert_eq!(attributes.provincia, None);
        assert_eq!(attributes.municipio, None);
        assert_eq!(attributes.poligono.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_zero_features_is_unresolved_not_error() {
        let resolver = CadastralResolver::new(FixedLookup::new(vec![]));
        let attributes = resolver.resolve_by_point(37.9, -4.78).await.unwrap();
        assert!(attributes.is_unresolved());
    }

    #[tokio::test]
    async fn test_multiple_features_uses_first() {
        let resolver = CadastralResolver::new(FixedLookup::new(vec![
            json!({"provincia": "14"}),
            json!({"provincia": "41"}),
        ]));
        let attributes = resolver.resolve_by_point(37.9, -4.78).await.unwrap();
        assert_eq!(attributes.provincia.as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let resolver = CadastralResolver::new(FixedLookup::new(vec![json!({"provincia": "14"})]));
        let path: HierarchyPath = "14:21".parse().unwrap();
        let first = resolver.resolve_by_hierarchy(&path).await.unwrap();
        let second = resolver.resolve_by_hierarchy(&path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.lookup().calls.load(Ordering::SeqCst), 2);
    }
}
