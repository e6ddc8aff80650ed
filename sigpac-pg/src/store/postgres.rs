//! Magasin PostGIS des parcelles sauvegardées

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use geo::Geometry;
use sigpac::{
    CadastralAttributes, NewParcel, ParcelId, ParcelSource, ParcelStore, SaveOutcome, SavedParcel,
    SigpacError,
};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, info, warn};

use super::geomhash::{hash_to_hex, polygon_hash};

/// Implémentation PostGIS de [`ParcelStore`].
///
/// Les géométries sont stockées en WGS84 (SRID 4326). Un hash normalisé de
/// la géométrie permet de détecter les doublons à la sauvegarde.
pub struct PgParcelStore {
    pool: Pool,
    schema: String,
}

impl PgParcelStore {
    pub fn new(pool: Pool, schema: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        Ok(Self { pool, schema })
    }

    /// Crée le schéma et la table des parcelles si nécessaire
    pub async fn init_schema(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        if let Err(e) = client
            .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
            .await
        {
            warn!("Could not create postgis extension (may already exist): {e}");
        }

        client
            .execute(
                &format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema),
                &[],
            )
            .await
            .with_context(|| format!("Failed to create schema {}", self.schema))?;

        client
            .batch_execute(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {schema}.parcelas (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL,
                    provincia TEXT,
                    municipio TEXT,
                    poligono TEXT,
                    parcela TEXT,
                    recinto TEXT,
                    area_ha DOUBLE PRECISION,
                    source TEXT,
                    centroid geometry(Point, 4326),
                    geometry geometry(Polygon, 4326),
                    geometry_hash BYTEA,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS parcelas_geometry_hash_idx
                    ON {schema}.parcelas (geometry_hash);
                CREATE INDEX IF NOT EXISTS parcelas_geometry_idx
                    ON {schema}.parcelas USING GIST (geometry);
                "#,
                schema = self.schema
            ))
            .await
            .context("Failed to create parcelas table")?;

        info!("Schema {} ready", self.schema);
        Ok(())
    }

    async fn save_inner(&self, parcel: &NewParcel) -> Result<SaveOutcome> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        let hash = parcel.geometry.as_ref().map(polygon_hash);

        if let Some(hash) = &hash {
            let row = client
                .query_opt(
                    &format!(
                        "SELECT id FROM {}.parcelas WHERE geometry_hash = $1 LIMIT 1",
                        self.schema
                    ),
                    &[&hash.as_slice()],
                )
                .await
                .context("Duplicate lookup failed")?;
            if let Some(row) = row {
                let id: ParcelId = row.get(0);
                debug!(
                    "Geometry hash {} already saved as parcel {id}",
                    hash_to_hex(hash)
                );
                return Ok(SaveOutcome::Duplicate(id));
            }
        }

        let geometry_wkb = parcel
            .geometry
            .as_ref()
            .map(|p| geometry_wkb(&Geometry::Polygon(p.clone())))
            .transpose()?;
        let centroid_wkb = parcel
            .centroid
            .map(|p| self::geometry_wkb(&Geometry::Point(p)))
            .transpose()?;
        let source = parcel.source.map(ParcelSource::as_str);
        let hash_bytes = hash.as_ref().map(|h| h.as_slice());

        let params: [&(dyn ToSql + Sync); 11] = [
            &parcel.name,
            &parcel.attributes.provincia,
            &parcel.attributes.municipio,
            &parcel.attributes.poligono,
            &parcel.attributes.parcela,
            &parcel.attributes.recinto,
            &parcel.area_hectares,
            &source,
            &centroid_wkb,
            &geometry_wkb,
            &hash_bytes,
        ];

        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO {}.parcelas
                        (name, provincia, municipio, poligono, parcela, recinto,
                         area_ha, source, centroid, geometry, geometry_hash)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                            ST_GeomFromWKB($9, 4326), ST_GeomFromWKB($10, 4326), $11)
                    RETURNING id
                    "#,
                    self.schema
                ),
                &params,
            )
            .await
            .context("Insert failed")?;

        let id: ParcelId = row.get(0);
        info!("Saved parcel {id} ({})", parcel.name);
        Ok(SaveOutcome::Inserted(id))
    }

    async fn list_inner(&self) -> Result<Vec<SavedParcel>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        let rows = client
            .query(
                &format!(
                    "SELECT id, name, provincia, municipio, poligono, parcela, recinto,
                            area_ha, source, created_at::text
                     FROM {}.parcelas
                     ORDER BY created_at DESC, id DESC",
                    self.schema
                ),
                &[],
            )
            .await
            .context("List query failed")?;
        Ok(rows.iter().map(saved_from_row).collect())
    }

    async fn get_inner(&self, id: ParcelId) -> Result<Option<SavedParcel>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT id, name, provincia, municipio, poligono, parcela, recinto,
                            area_ha, source, created_at::text
                     FROM {}.parcelas WHERE id = $1",
                    self.schema
                ),
                &[&id],
            )
            .await
            .context("Get query failed")?;
        Ok(row.as_ref().map(saved_from_row))
    }

    async fn delete_inner(&self, id: ParcelId) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        let deleted = client
            .execute(
                &format!("DELETE FROM {}.parcelas WHERE id = $1", self.schema),
                &[&id],
            )
            .await
            .context("Delete failed")?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl ParcelStore for PgParcelStore {
    async fn save(&self, parcel: &NewParcel) -> Result<SaveOutcome, SigpacError> {
        self.save_inner(parcel)
            .await
            .map_err(|e| SigpacError::persistence(format!("{e:#}")))
    }

    async fn list(&self) -> Result<Vec<SavedParcel>, SigpacError> {
        self.list_inner()
            .await
            .map_err(|e| SigpacError::persistence(format!("{e:#}")))
    }

    async fn get(&self, id: ParcelId) -> Result<Option<SavedParcel>, SigpacError> {
        self.get_inner(id)
            .await
            .map_err(|e| SigpacError::persistence(format!("{e:#}")))
    }

    async fn delete(&self, id: ParcelId) -> Result<bool, SigpacError> {
        self.delete_inner(id)
            .await
            .map_err(|e| SigpacError::persistence(format!("{e:#}")))
    }
}

/// Encode une géométrie en WKB, décodée côté serveur par ST_GeomFromWKB
fn geometry_wkb(geometry: &Geometry<f64>) -> Result<Vec<u8>> {
    wkb::geom_to_wkb(geometry).map_err(|e| anyhow!("WKB encoding failed: {e:?}"))
}

fn saved_from_row(row: &Row) -> SavedParcel {
    let source: Option<String> = row.get(8);
    SavedParcel {
        id: row.get(0),
        name: row.get(1),
        attributes: CadastralAttributes {
            provincia: row.get(2),
            municipio: row.get(3),
            poligono: row.get(4),
            parcela: row.get(5),
            recinto: row.get(6),
        },
        area_hectares: row.get(7),
        source: source.as_deref().and_then(ParcelSource::parse),
        created_at: row.get(9),
    }
}

/// Le nom de schéma est interpolé dans les requêtes : seul un identifiant
/// simple est accepté.
fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid schema name: {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("sigpac").is_ok());
        assert!(validate_identifier("sigpac_2024").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1schema").is_err());
        assert!(validate_identifier("public; DROP TABLE x").is_err());
    }

    #[test]
    fn test_geometry_wkb_point() {
        let wkb = geometry_wkb(&Geometry::Point(geo::Point::new(-4.775, 37.8825))).unwrap();
        // 1 octet d'ordre + type u32 + deux f64
        assert_eq!(wkb.len(), 21);
    }
}
