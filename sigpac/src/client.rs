//! Client HTTP du service de consultation SIGPAC
//!
//! Implémente `CadastralLookup` contre les endpoints de consultation :
//! listes d'options par couche (`query/{couche}/{ancêtres}.json`),
//! attributs par chemin (`recinfo/{codes}.json`), attributs par boîte
//! (`recinfobybbox/{bbox}.json`) et géométrie GeoJSON d'une référence
//! complète (`geometry/{codes}.json`).
//!
//! Ni retry ni timeout ici : le transport est supposé renvoyer du JSON
//! bien formé ou échouer avec une erreur de transport.

use async_trait::async_trait;
use geo::Polygon;
use geojson::GeoJson;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{LookupError, SigpacError};
use crate::hierarchy::HierarchyLevel;
use crate::resolver::{value_to_string, CadastralLookup};
use crate::types::{BoundingBox, HierarchyPath, LevelOption};

/// URL de base par défaut du service de consultation
pub const DEFAULT_BASE_URL: &str = "https://sigpac-hubcloud.es/servicioconsultassigpac/";

/// Variable d'environnement surchargant l'URL de base
pub const BASE_URL_ENV: &str = "SIGPAC_BASE_URL";

/// Client du service de consultation SIGPAC
#[derive(Debug, Clone)]
pub struct SigpacClient {
    client: Client,
    base_url: Url,
}

impl SigpacClient {
    /// Crée un client sur une URL de base donnée
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Crée un client en réutilisant un `reqwest::Client` existant
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Crée un client depuis `SIGPAC_BASE_URL`, ou l'URL par défaut
    pub fn from_env() -> Result<Self, SigpacError> {
        let mut raw = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        // Sans slash final, Url::join remplacerait le dernier segment
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Self::new(Url::parse(&raw)?))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[String]) -> Result<Url, LookupError> {
        let path = format!("{}.json", segments.join("/"));
        self.base_url
            .join(&path)
            .map_err(|e| LookupError::malformed(self.base_url.as_str(), e.to_string()))
    }

    async fn get_json(&self, url: &Url) -> Result<Value, LookupError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    /// Géométrie d'une référence cadastrale (GeoJSON → polygone WGS84).
    ///
    /// C'est le chargement explicite qui complète une sélection
    /// hiérarchique ; `None` si le service ne connaît pas de géométrie pour
    /// cette référence.
    pub async fn geometry_by_path(
        &self,
        path: &HierarchyPath,
    ) -> Result<Option<Polygon<f64>>, LookupError> {
        let mut segments = vec!["geometry".to_string()];
        segments.extend(path.codes().iter().cloned());
        let url = self.endpoint(&segments)?;
        let payload = self.get_json(&url).await?;
        parse_geometry(payload).map_err(|reason| LookupError::malformed(url.as_str(), reason))
    }
}

#[async_trait]
impl CadastralLookup for SigpacClient {
    async fn level_options(
        &self,
        level: HierarchyLevel,
        ancestors: &[String],
    ) -> Result<Vec<LevelOption>, LookupError> {
        let mut segments = vec!["query".to_string(), level.layer().to_string()];
        segments.extend(ancestors.iter().cloned());
        let url = self.endpoint(&segments)?;
        let payload = self.get_json(&url).await?;
        let records = feature_array(&url, payload)?;
        Ok(records.iter().filter_map(option_from_record).collect())
    }

    async fn features_by_path(&self, path: &HierarchyPath) -> Result<Vec<Value>, LookupError> {
        let mut segments = vec!["recinfo".to_string()];
        segments.extend(path.codes().iter().cloned());
        let url = self.endpoint(&segments)?;
        let payload = self.get_json(&url).await?;
        feature_array(&url, payload)
    }

    async fn features_in(&self, bbox: &BoundingBox) -> Result<Vec<Value>, LookupError> {
        let segments = vec![
            "recinfobybbox".to_string(),
            format!("{:.6}", bbox.min_lng),
            format!("{:.6}", bbox.min_lat),
            format!("{:.6}", bbox.max_lng),
            format!("{:.6}", bbox.max_lat),
        ];
        let url = self.endpoint(&segments)?;
        let payload = self.get_json(&url).await?;
        feature_array(&url, payload)
    }
}

/// Extrait la liste d'enregistrements d'un payload : tableau nu ou objet
/// avec tableau `features`
fn feature_array(url: &Url, payload: Value) -> Result<Vec<Value>, LookupError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("features") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(LookupError::malformed(
                url.as_str(),
                "`features` is not an array",
            )),
            None => Err(LookupError::malformed(
                url.as_str(),
                "missing `features` array",
            )),
        },
        _ => Err(LookupError::malformed(
            url.as_str(),
            "expected an array or a `features` object",
        )),
    }
}

/// Normalise un enregistrement d'option (clés sous plusieurs alias)
fn option_from_record(record: &Value) -> Option<LevelOption> {
    let map = record.as_object()?;
    let code = pick(map, &["codigo", "code", "id"])?;
    let label = pick(map, &["descripcion", "nombre", "label"]).unwrap_or_else(|| code.clone());
    Some(LevelOption { code, label })
}

fn pick(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| map.get(*key).and_then(value_to_string))
}

/// Extrait un polygone d'un payload GeoJSON (Feature, FeatureCollection ou
/// géométrie nue). Pour un MultiPolygon, le premier polygone est retenu.
fn parse_geometry(payload: Value) -> Result<Option<Polygon<f64>>, String> {
    let geojson = GeoJson::from_json_value(payload).map_err(|e| e.to_string())?;
    let geometry = match geojson {
        GeoJson::Geometry(g) => Some(g),
        GeoJson::Feature(f) => f.geometry,
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().find_map(|f| f.geometry),
    };

    let Some(geometry) = geometry else {
        return Ok(None);
    };

    let geometry = geo::Geometry::<f64>::try_from(geometry).map_err(|e| e.to_string())?;
    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(Some(polygon)),
        geo::Geometry::MultiPolygon(multi) => Ok(multi.0.into_iter().next()),
        other => Err(format!(
            "expected a polygon geometry, got {}",
            geometry_kind(&other)
        )),
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SigpacClient {
        let mut base = server.uri();
        base.push('/');
        SigpacClient::new(Url::parse(&base).unwrap())
    }

    #[tokio::test]
    async fn test_level_options_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/municipios/14.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"codigo": 21, "descripcion": "Córdoba"},
                {"codigo": 22, "descripcion": "Encinas Reales"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = client
            .level_options(HierarchyLevel::Municipio, &["14".to_string()])
            .await
            .unwrap();

        assert_eq!(options.len(), 2);
        assert_eq!(options[0], LevelOption::new("21", "Córdoba"));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_level_options_empty_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/provincias.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = client
            .level_options(HierarchyLevel::Provincia, &[])
            .await
            .unwrap();
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn test_features_by_path_wrapped_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recinfo/14/21/3/12/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [{"provincia": 14, "municipio": 21}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reference: HierarchyPath = "14:21:3:12:1".parse().unwrap();
        let features = client.features_by_path(&reference).await.unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["provincia"], json!(14));
    }

    #[tokio::test]
    async fn test_features_in_bbox_url_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/recinfobybbox/-4.780500/37.899500/-4.779500/37.900500.json",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bbox = BoundingBox::around(37.9, -4.78, 0.0005);
        let features = client.features_in(&bbox).await.unwrap();
        assert!(features.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recinfo/14.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reference: HierarchyPath = "14".parse().unwrap();
        match client.features_by_path(&reference).await {
            Err(LookupError::MalformedPayload { reason, .. }) => {
                assert!(reason.contains("features"));
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query/provincias.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        match client.level_options(HierarchyLevel::Provincia, &[]).await {
            Err(LookupError::Transport(_)) => {}
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_geometry_by_path_feature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geometry/14/21/3/12/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "Feature",
                "properties": {"provincia": 14},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-4.780, 37.880],
                        [-4.770, 37.880],
                        [-4.770, 37.885],
                        [-4.780, 37.885],
                        [-4.780, 37.880]
                    ]]
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reference: HierarchyPath = "14:21:3:12:1".parse().unwrap();
        let polygon = client.geometry_by_path(&reference).await.unwrap().unwrap();
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[tokio::test]
    async fn test_geometry_by_path_empty_collection_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geometry/14/21/3/12/1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "features": []
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reference: HierarchyPath = "14:21:3:12:1".parse().unwrap();
        assert!(client.geometry_by_path(&reference).await.unwrap().is_none());
    }
}
