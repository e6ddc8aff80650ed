//! # sigpac
//!
//! Sélection en cascade et consultation du cadastre agricole espagnol
//! (SIGPAC) : chaîne provincia → municipio → poligono → parcela → recinto,
//! résolution d'attributs par chemin ou par point, mesure de surface et
//! réconciliation des deux modalités de saisie en une parcelle active
//! unique.
//!
//! ## Features
//!
//! - Chaîne de sélection pure avec invalidation en cascade et jetons de
//!   génération (les réponses obsolètes sont ignorées, dernier écrivain
//!   gagnant)
//! - Résolution d'attributs tolérante aux formes de réponse hétérogènes du
//!   service de consultation
//! - Surface géodésique en hectares via les types `geo`
//! - Frontières explicites (`CadastralLookup`, `ParcelStore`) pour le
//!   service distant et la persistance
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sigpac::{
//!     CadastralResolver, HierarchyLevel, ParcelReconciler, SelectionChain, SigpacClient,
//! };
//!
//! let client = SigpacClient::from_env()?;
//! let mut chain = SelectionChain::new();
//! chain.load_options(HierarchyLevel::Provincia, &client).await?;
//! chain.set_selection(HierarchyLevel::Provincia, "14");
//! // ... municipio, poligono, parcela, recinto ...
//!
//! let mut reconciler = ParcelReconciler::new(CadastralResolver::new(client));
//! reconciler.on_hierarchy_complete(&chain).await?;
//! println!("{:?}", reconciler.active().attributes);
//! ```

pub mod client;
pub mod error;
pub mod hierarchy;
pub mod measure;
pub mod reconciler;
pub mod resolver;
pub mod selection;
pub mod store;
pub mod types;

pub use client::SigpacClient;
pub use error::{LookupError, SigpacError};
pub use hierarchy::HierarchyLevel;
pub use reconciler::{ActiveParcel, LookupOutcome, ParcelReconciler, ParcelSource};
pub use resolver::{CadastralLookup, CadastralResolver, POINT_EPSILON_DEG};
pub use selection::{LoadOutcome, LoadTicket, SelectionChain};
pub use store::{NewParcel, ParcelId, ParcelStore, SaveOutcome, SavedParcel};
pub use types::{BoundingBox, CadastralAttributes, HierarchyPath, LevelOption};
