//! Définition et implémentation des commandes CLI
//!
//! - `options`: liste les codes sélectionnables d'un niveau
//! - `resolve`: résout une référence cadastrale ou un point WGS84
//! - `save`: résout puis sauvegarde une parcelle dans PostGIS
//! - `list` / `show` / `delete`: gestion des parcelles sauvegardées

use anyhow::{anyhow, bail, Result};
use clap::Args;
use clap::Subcommand;
use tracing::{info, warn};

use sigpac::measure::polygon_from_vertices;
use sigpac::{
    ActiveParcel, CadastralAttributes, CadastralResolver, HierarchyLevel, HierarchyPath,
    LookupOutcome, ParcelReconciler, ParcelStore, SaveOutcome, SavedParcel, SelectionChain,
    SigpacClient,
};

use crate::store::{create_pool, test_connection, DatabaseConfig, PgParcelStore};

/// Connexion PostgreSQL (les valeurs absentes viennent de l'environnement)
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / sigpac)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,

    /// Schéma contenant la table des parcelles (défaut : env PGSCHEMA / sigpac)
    #[arg(long)]
    pub schema: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the selectable codes of a hierarchy level
    Options {
        /// Level: provincia, municipio, poligono, parcela, recinto
        #[arg(short, long)]
        level: String,

        /// Ancestor codes, colon-separated (ex: 14:21 for poligonos)
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Resolve cadastral attributes for a reference or a point
    Resolve {
        /// Cadastral reference provincia:municipio:poligono:parcela:recinto
        /// (may be partial, ex: 14:21)
        #[arg(short, long, conflicts_with = "point")]
        reference: Option<String>,

        /// WGS84 point "lat,lng"
        #[arg(long)]
        point: Option<String>,
    },

    /// Resolve a parcel and save it to PostGIS
    Save {
        /// User-chosen name for the saved parcel
        #[arg(short, long)]
        name: String,

        /// Full cadastral reference (5 codes)
        #[arg(short, long, conflicts_with = "polygon")]
        reference: Option<String>,

        /// Drawn polygon vertices "lng,lat lng,lat ..." (WGS84)
        #[arg(long)]
        polygon: Option<String>,

        /// Fetch and attach the reference geometry from the service
        #[arg(long)]
        with_geometry: bool,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// List saved parcels, most recent first
    List {
        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Show one saved parcel
    Show {
        /// Parcel id
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Delete a saved parcel
    Delete {
        /// Parcel id
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        db: DatabaseArgs,
    },
}

/// Exécute la commande options
pub async fn cmd_options(level: &str, parent: Option<&str>) -> Result<()> {
    let level: HierarchyLevel = level.parse().map_err(|e: String| anyhow!(e))?;

    let mut chain = SelectionChain::new();
    if let Some(parent) = parent {
        let path: HierarchyPath = parent.parse().map_err(|e: String| anyhow!(e))?;
        if path.codes().len() > level.depth() {
            bail!(
                "Parent path '{}' is too deep for level {} ({} ancestor(s) expected)",
                parent,
                level,
                level.depth()
            );
        }
        for (depth, code) in path.codes().iter().enumerate() {
            chain.set_selection(HierarchyLevel::ALL[depth], code);
        }
    }

    let client = SigpacClient::from_env()?;
    chain.load_options(level, &client).await?;

    let options = chain.options(level).unwrap_or(&[]);
    println!("{} {} found", options.len(), level.layer());
    for option in options {
        println!("  {}  {}", option.code, option.label);
    }
    Ok(())
}

/// Exécute la commande resolve
pub async fn cmd_resolve(reference: Option<&str>, point: Option<&str>) -> Result<()> {
    let client = SigpacClient::from_env()?;
    let mut reconciler = ParcelReconciler::new(CadastralResolver::new(client));

    match (reference, point) {
        (Some(raw), None) => {
            let path: HierarchyPath = raw.parse().map_err(|e: String| anyhow!(e))?;
            if path.is_full() {
                let chain = chain_from_path(&path);
                reconciler.on_hierarchy_complete(&chain).await?;
                print_active(reconciler.active());
            } else {
                info!(path = %path, "Resolving partial reference");
                let attributes = reconciler.resolver().resolve_by_hierarchy(&path).await?;
                print_attributes(&attributes);
            }
        }
        (None, Some(raw)) => {
            let (lat, lng) = parse_point(raw)?;
            reconciler.on_map_clicked(lat, lng).await;
            print_active(reconciler.active());
        }
        _ => bail!("Provide exactly one of --reference or --point"),
    }
    Ok(())
}

/// Exécute la commande save
pub async fn cmd_save(
    name: &str,
    reference: Option<&str>,
    polygon: Option<&str>,
    with_geometry: bool,
    db: &DatabaseArgs,
) -> Result<()> {
    let client = SigpacClient::from_env()?;
    let mut reconciler = ParcelReconciler::new(CadastralResolver::new(client.clone()));

    match (reference, polygon) {
        (Some(raw), None) => {
            let path: HierarchyPath = raw.parse().map_err(|e: String| anyhow!(e))?;
            if !path.is_full() {
                bail!("A full reference (5 codes) is required to save, got '{}'", raw);
            }
            let chain = chain_from_path(&path);
            reconciler.on_hierarchy_complete(&chain).await?;

            if with_geometry {
                match client.geometry_by_path(&path).await? {
                    Some(shape) => reconciler.attach_geometry(shape),
                    None => warn!(path = %path, "No geometry known for this reference"),
                }
            }
        }
        (None, Some(raw)) => {
            let vertices = parse_vertices(raw)?;
            reconciler.on_geometry_drawn(polygon_from_vertices(&vertices)).await;
        }
        _ => bail!("Provide exactly one of --reference or --polygon"),
    }

    print_active(reconciler.active());

    let store = open_store(db).await?;
    match reconciler.save(name, &store).await? {
        SaveOutcome::Inserted(id) => println!("Saved '{}' as parcel {}", name, id),
        SaveOutcome::Duplicate(id) => {
            println!("Identical geometry already saved as parcel {}, nothing inserted", id)
        }
    }
    Ok(())
}

/// Exécute la commande list
pub async fn cmd_list(db: &DatabaseArgs) -> Result<()> {
    let store = open_store(db).await?;
    let parcels = store.list().await?;

    println!("{} saved parcel(s)", parcels.len());
    for parcel in &parcels {
        println!(
            "  {}  {}  [{}]  {}  {}",
            parcel.id,
            parcel.name,
            reference_of(&parcel.attributes),
            format_area(parcel.area_hectares),
            parcel.created_at.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Exécute la commande show
pub async fn cmd_show(id: i64, db: &DatabaseArgs) -> Result<()> {
    let store = open_store(db).await?;
    match store.get(id).await? {
        Some(parcel) => print_saved(&parcel),
        None => bail!("No parcel with id {}", id),
    }
    Ok(())
}

/// Exécute la commande delete
pub async fn cmd_delete(id: i64, db: &DatabaseArgs) -> Result<()> {
    let store = open_store(db).await?;
    if store.delete(id).await? {
        println!("Deleted parcel {}", id);
    } else {
        bail!("No parcel with id {}", id);
    }
    Ok(())
}

/// Reconstruit une chaîne complète depuis un chemin à cinq codes
fn chain_from_path(path: &HierarchyPath) -> SelectionChain {
    let mut chain = SelectionChain::new();
    for (depth, code) in path.codes().iter().enumerate() {
        if let Some(level) = HierarchyLevel::from_depth(depth) {
            chain.set_selection(level, code);
        }
    }
    chain
}

/// Parse un point "lat,lng"
fn parse_point(raw: &str) -> Result<(f64, f64)> {
    let mut parts = raw.split(',').map(str::trim);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lng), None) => {
            let lat: f64 = lat
                .parse()
                .map_err(|_| anyhow!("Invalid latitude: {}", lat))?;
            let lng: f64 = lng
                .parse()
                .map_err(|_| anyhow!("Invalid longitude: {}", lng))?;
            Ok((lat, lng))
        }
        _ => bail!("Invalid point: '{}'. Expected \"lat,lng\"", raw),
    }
}

/// Parse une liste de sommets "lng,lat lng,lat ..."
fn parse_vertices(raw: &str) -> Result<Vec<(f64, f64)>> {
    let mut vertices = Vec::new();
    for token in raw.split_whitespace() {
        let mut parts = token.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lng), Some(lat), None) => {
                let lng: f64 = lng
                    .parse()
                    .map_err(|_| anyhow!("Invalid longitude in vertex '{}'", token))?;
                let lat: f64 = lat
                    .parse()
                    .map_err(|_| anyhow!("Invalid latitude in vertex '{}'", token))?;
                vertices.push((lng, lat));
            }
            _ => bail!("Invalid vertex: '{}'. Expected \"lng,lat\"", token),
        }
    }
    if vertices.is_empty() {
        bail!("Empty polygon: at least one \"lng,lat\" vertex is required");
    }
    Ok(vertices)
}

/// Ouvre le magasin PostGIS (connexion + schéma prêt)
async fn open_store(args: &DatabaseArgs) -> Result<PgParcelStore> {
    let mut config = DatabaseConfig::from_env();
    apply_database_overrides(&mut config, args);

    info!(
        host = %config.host,
        dbname = %config.dbname,
        schema = %config.schema,
        "Connecting to PostgreSQL"
    );
    let pool = create_pool(&config).await?;
    test_connection(&pool).await?;

    let store = PgParcelStore::new(pool, config.schema.clone())?;
    store.init_schema().await?;
    Ok(store)
}

fn apply_database_overrides(config: &mut DatabaseConfig, args: &DatabaseArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(database) = &args.database {
        config.dbname = database.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ssl) = &args.ssl {
        if let Ok(mode) = ssl.parse() {
            config.ssl_mode = mode;
        }
    }
    if let Some(schema) = &args.schema {
        config.schema = schema.clone();
    }
}

fn print_active(active: &ActiveParcel) {
    print_attributes(&active.attributes);
    println!("Area: {}", format_area(active.area_hectares));
    if let Some(center) = active.centroid() {
        println!("Centroid: {:.6},{:.6}", center.y(), center.x());
    }
    if let Some(source) = active.source {
        println!("Source: {}", source.as_str());
    }
    match &active.last_lookup {
        Some(LookupOutcome::NotFound) => println!("No cadastral coverage at this location"),
        Some(LookupOutcome::Failed(reason)) => println!("Lookup failed: {}", reason),
        Some(LookupOutcome::Resolved) | None => {}
    }
}

fn print_attributes(attributes: &CadastralAttributes) {
    if attributes.is_unresolved() {
        println!("Attributes: unresolved");
        return;
    }
    for level in HierarchyLevel::ALL {
        if let Some(code) = attributes.get(level) {
            println!("{}: {}", level.name(), code);
        }
    }
}

fn print_saved(parcel: &SavedParcel) {
    println!("Parcel {}: {}", parcel.id, parcel.name);
    print_attributes(&parcel.attributes);
    println!("Area: {}", format_area(parcel.area_hectares));
    if let Some(source) = parcel.source {
        println!("Source: {}", source.as_str());
    }
    if let Some(created_at) = &parcel.created_at {
        println!("Created: {}", created_at);
    }
}

fn format_area(area: Option<f64>) -> String {
    match area {
        Some(area) => format!("{:.4} ha", area),
        None => "-".to_string(),
    }
}

fn reference_of(attributes: &CadastralAttributes) -> String {
    if attributes.is_unresolved() {
        return "-".to_string();
    }
    let mut path = HierarchyPath::new();
    for level in HierarchyLevel::ALL {
        match attributes.get(level) {
            Some(code) => path.push(code),
            None => break,
        }
    }
    path.to_string()
}
