//! Réconciliation des deux modalités de saisie en une parcelle active unique
//!
//! La sélection hiérarchique et l'interaction carte (dessin, clic)
//! convergent ici : le réconciliateur détient l'unique `ActiveParcel` et le
//! remplace atomiquement à chaque résolution aboutie. Un échec de
//! consultation est enregistré sur l'instantané au lieu d'être propagé :
//! la géométrie et la surface restent utilisables (et sauvegardables) même
//! quand l'attribution cadastrale échoue.

use geo::{Point, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SigpacError;
use crate::measure;
use crate::resolver::{CadastralLookup, CadastralResolver};
use crate::selection::SelectionChain;
use crate::store::{NewParcel, ParcelStore, SaveOutcome};
use crate::types::CadastralAttributes;

/// Origine de la parcelle active courante
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelSource {
    /// Sélection hiérarchique complète
    Hierarchy,
    /// Forme dessinée sur la carte
    Draw,
    /// Clic sur la carte
    Click,
}

impl ParcelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ParcelSource::Hierarchy => "hierarchy",
            ParcelSource::Draw => "draw",
            ParcelSource::Click => "click",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hierarchy" => Some(ParcelSource::Hierarchy),
            "draw" => Some(ParcelSource::Draw),
            "click" => Some(ParcelSource::Click),
            _ => None,
        }
    }
}

/// Issue de la dernière consultation d'attributs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Attributs résolus depuis le service
    Resolved,
    /// Réponse vide du service : résultat « non trouvé », valide et
    /// distinct d'une erreur
    NotFound,
    /// Consultation en échec (transport ou payload) ; le message rendu de
    /// la `LookupError` est conservé
    Failed(String),
}

/// Instantané canonique de la parcelle d'intérêt courante.
///
/// Toujours remplacé en bloc, jamais modifié champ par champ : un
/// consommateur ne peut pas observer une surface calculée depuis une autre
/// géométrie que celle présente.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveParcel {
    /// Géométrie active (au plus une à la fois)
    pub geometry: Option<Polygon<f64>>,
    /// Attributs cadastraux résolus (champs absents = non résolus)
    pub attributes: CadastralAttributes,
    /// Surface en hectares, calculée depuis `geometry`
    pub area_hectares: Option<f64>,
    /// Modalité d'entrée ayant produit l'instantané
    pub source: Option<ParcelSource>,
    /// Issue de la dernière consultation (None = aucune consultation)
    pub last_lookup: Option<LookupOutcome>,
}

impl ActiveParcel {
    /// Centroïde de la géométrie active (x = longitude, y = latitude)
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.as_ref().and_then(measure::centroid)
    }
}

/// Source de vérité unique pour la parcelle active
#[derive(Debug)]
pub struct ParcelReconciler<L> {
    resolver: CadastralResolver<L>,
    active: ActiveParcel,
}

impl<L: CadastralLookup> ParcelReconciler<L> {
    pub fn new(resolver: CadastralResolver<L>) -> Self {
        Self {
            resolver,
            active: ActiveParcel::default(),
        }
    }

    /// Instantané courant
    pub fn active(&self) -> &ActiveParcel {
        &self.active
    }

    pub fn resolver(&self) -> &CadastralResolver<L> {
        &self.resolver
    }

    /// Remet la parcelle active à zéro
    pub fn reset(&mut self) {
        self.active = ActiveParcel::default();
    }

    /// La chaîne de sélection vient d'être complétée : résout le chemin
    /// entier.
    ///
    /// Ne produit pas de géométrie : celle de l'éventuelle parcelle active
    /// précédente est conservée en attendant un chargement explicite via
    /// [`attach_geometry`](Self::attach_geometry).
    pub async fn on_hierarchy_complete(
        &mut self,
        chain: &SelectionChain,
    ) -> Result<(), SigpacError> {
        if !chain.is_complete() {
            return Err(SigpacError::IncompleteSelection);
        }
        let path = chain.path();
        debug!(path = %path, "Resolving completed hierarchy selection");

        let (attributes, outcome) = match self.resolver.resolve_by_hierarchy(&path).await {
            Ok(attributes) => {
                let outcome = if attributes.is_unresolved() {
                    LookupOutcome::NotFound
                } else {
                    LookupOutcome::Resolved
                };
                (attributes, outcome)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Hierarchy resolution failed");
                (
                    CadastralAttributes::default(),
                    LookupOutcome::Failed(e.to_string()),
                )
            }
        };

        self.active = ActiveParcel {
            geometry: self.active.geometry.clone(),
            area_hectares: self.active.area_hectares,
            attributes,
            source: Some(ParcelSource::Hierarchy),
            last_lookup: Some(outcome),
        };
        Ok(())
    }

    /// L'utilisateur a terminé un dessin : remplace intégralement la
    /// parcelle active.
    ///
    /// La surface est calculée sur la forme, les attributs sont résolus au
    /// centroïde. Une forme dégénérée donne une surface absente sans
    /// consultation (il n'y a pas de point à résoudre), jamais une erreur.
    pub async fn on_geometry_drawn(&mut self, polygon: Polygon<f64>) {
        let area_hectares = measure::area_hectares(&polygon);
        let (attributes, outcome) = match measure::centroid(&polygon) {
            Some(center) => {
                match self.resolver.resolve_by_point(center.y(), center.x()).await {
                    Ok(attributes) => {
                        let outcome = if attributes.is_unresolved() {
                            LookupOutcome::NotFound
                        } else {
                            LookupOutcome::Resolved
                        };
                        (attributes, Some(outcome))
                    }
                    Err(e) => {
                        warn!(error = %e, "Point resolution of drawn shape failed");
                        (
                            CadastralAttributes::default(),
                            Some(LookupOutcome::Failed(e.to_string())),
                        )
                    }
                }
            }
            None => {
                debug!("Drawn shape is degenerate, skipping attribute resolution");
                (CadastralAttributes::default(), None)
            }
        };

        self.active = ActiveParcel {
            geometry: Some(polygon),
            area_hectares,
            attributes,
            source: Some(ParcelSource::Draw),
            last_lookup: outcome,
        };
    }

    /// Clic sur la carte : raffine les attributs, ne touche jamais à la
    /// géométrie ni à la surface.
    ///
    /// Un clic sans couverture cadastrale efface les attributs mais laisse
    /// intactes la géométrie, la surface et la source existantes : il ne
    /// doit pas détruire une sélection valide.
    pub async fn on_map_clicked(&mut self, lat: f64, lng: f64) {
        let (attributes, source, outcome) = match self.resolver.resolve_by_point(lat, lng).await {
            Ok(attributes) if !attributes.is_unresolved() => (
                attributes,
                Some(ParcelSource::Click),
                LookupOutcome::Resolved,
            ),
            Ok(_) => {
                debug!(lat, lng, "No cadastral coverage at clicked point");
                (
                    CadastralAttributes::default(),
                    self.active.source,
                    LookupOutcome::NotFound,
                )
            }
            Err(e) => {
                warn!(lat, lng, error = %e, "Point resolution failed");
                (
                    CadastralAttributes::default(),
                    self.active.source,
                    LookupOutcome::Failed(e.to_string()),
                )
            }
        };

        self.active = ActiveParcel {
            geometry: self.active.geometry.clone(),
            area_hectares: self.active.area_hectares,
            attributes,
            source,
            last_lookup: Some(outcome),
        };
    }

    /// Rattache une géométrie chargée après coup (cas de la sélection
    /// hiérarchique) ; recalcule la surface, conserve attributs et source.
    pub fn attach_geometry(&mut self, polygon: Polygon<f64>) {
        let area_hectares = measure::area_hectares(&polygon);
        self.active = ActiveParcel {
            geometry: Some(polygon),
            area_hectares,
            attributes: self.active.attributes.clone(),
            source: self.active.source,
            last_lookup: self.active.last_lookup.clone(),
        };
    }

    /// Transmet l'instantané courant au magasin, sous un nom choisi par
    /// l'utilisateur. Un seul essai : l'échec est remonté à l'appelant.
    pub async fn save<S>(&self, name: &str, store: &S) -> Result<SaveOutcome, SigpacError>
    where
        S: ParcelStore + ?Sized,
    {
        let record = NewParcel::from_active(name, &self.active);
        store.save(&record).await
    }
}
