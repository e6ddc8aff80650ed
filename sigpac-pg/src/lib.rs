//! # sigpac-pg
//!
//! Consultation du cadastre agricole espagnol (SIGPAC) et sauvegarde de
//! parcelles dans PostGIS.
//!
//! ## Features
//!
//! - Sélection hiérarchique en cascade (provincia → recinto) via le service
//!   de consultation SIGPAC
//! - Résolution d'attributs par référence cadastrale ou par point WGS84
//! - Sauvegarde des parcelles dans PostgreSQL/PostGIS avec pool de
//!   connexions et déduplication par hash de géométrie
//! - CLI simple
//!
//! ## Usage CLI
//!
//! ```bash
//! # Lister les municipios de la provincia 14
//! sigpac-pg options --level municipio --parent 14
//!
//! # Résoudre une référence complète ou un point
//! sigpac-pg resolve --reference 14:21:3:12:1
//! sigpac-pg resolve --point "37.8825,-4.775"
//!
//! # Sauvegarder avec la géométrie du service
//! sigpac-pg save --name "Olivar norte" --reference 14:21:3:12:1 --with-geometry
//! ```

pub mod store;

pub use store::{create_pool, DatabaseConfig, PgParcelStore};
