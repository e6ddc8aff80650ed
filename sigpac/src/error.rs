//! Types d'erreurs pour le crate sigpac

use thiserror::Error;

use crate::hierarchy::HierarchyLevel;

/// Échec d'une consultation du service cadastral distant.
///
/// Distinct d'un résultat vide : une réponse sans feature est un résultat
/// valide ("non trouvé"), pas une erreur.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Erreur de transport (réseau, statut HTTP non-2xx)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Payload illisible ou de forme inattendue
    #[error("malformed payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },
}

impl LookupError {
    /// Crée une erreur de payload malformé avec contexte
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Erreurs pouvant survenir dans la chaîne de sélection et la réconciliation
#[derive(Debug, Error)]
pub enum SigpacError {
    /// Consultation du service distant en échec
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Chargement d'options demandé alors qu'un niveau ancêtre n'est pas sélectionné
    #[error("cannot load options for {level}: ancestor {missing} is not selected")]
    MissingAncestor {
        level: HierarchyLevel,
        missing: HierarchyLevel,
    },

    /// Réconciliation hiérarchique demandée alors que la chaîne n'est pas complète
    #[error("selection chain is not complete: recinto has no selected code")]
    IncompleteSelection,

    /// URL de base invalide pour le client
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// Erreur du magasin de parcelles (implémentation externe)
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SigpacError {
    /// Crée une erreur de persistance avec contexte
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence(reason.into())
    }
}
