//! Types de données partagés du crate sigpac

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hierarchy::HierarchyLevel;

/// Une option sélectionnable pour un niveau (code + libellé d'affichage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOption {
    /// Code SIGPAC de l'option
    pub code: String,
    /// Libellé d'affichage
    pub label: String,
}

impl LevelOption {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Attributs cadastraux résolus depuis le service de consultation.
///
/// Chaque champ absent signifie « non résolu », pas une erreur : une
/// résolution ponctuelle hors couverture cadastrale laisse tous les champs
/// vides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadastralAttributes {
    pub provincia: Option<String>,
    pub municipio: Option<String>,
    pub poligono: Option<String>,
    pub parcela: Option<String>,
    pub recinto: Option<String>,
}

impl CadastralAttributes {
    /// Vrai si aucun champ n'est résolu
    pub fn is_unresolved(&self) -> bool {
        HierarchyLevel::ALL.iter().all(|&l| self.get(l).is_none())
    }

    /// Valeur du champ correspondant à un niveau
    pub fn get(&self, level: HierarchyLevel) -> Option<&str> {
        match level {
            HierarchyLevel::Provincia => self.provincia.as_deref(),
            HierarchyLevel::Municipio => self.municipio.as_deref(),
            HierarchyLevel::Poligono => self.poligono.as_deref(),
            HierarchyLevel::Parcela => self.parcela.as_deref(),
            HierarchyLevel::Recinto => self.recinto.as_deref(),
        }
    }

    /// Renseigne le champ correspondant à un niveau
    pub fn set(&mut self, level: HierarchyLevel, value: impl Into<String>) {
        let slot = match level {
            HierarchyLevel::Provincia => &mut self.provincia,
            HierarchyLevel::Municipio => &mut self.municipio,
            HierarchyLevel::Poligono => &mut self.poligono,
            HierarchyLevel::Parcela => &mut self.parcela,
            HierarchyLevel::Recinto => &mut self.recinto,
        };
        *slot = Some(value.into());
    }
}

/// Chemin hiérarchique de codes sélectionnés, contigu depuis Provincia.
///
/// Un chemin peut être partiel (par exemple provincia + municipio seulement)
/// mais jamais troué : le code d'un niveau n'a de sens que si tous ses
/// ancêtres sont présents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyPath {
    codes: Vec<String>,
}

impl HierarchyPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construit un chemin depuis des codes ordonnés (Provincia en premier)
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes: Vec<String> = codes
            .into_iter()
            .map(Into::into)
            .take(HierarchyLevel::COUNT)
            .collect();
        Self { codes }
    }

    /// Ajoute le code du niveau suivant
    pub fn push(&mut self, code: impl Into<String>) {
        if self.codes.len() < HierarchyLevel::COUNT {
            self.codes.push(code.into());
        }
    }

    /// Codes du chemin, du moins profond au plus profond
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Niveau le plus profond spécifié
    pub fn deepest(&self) -> Option<HierarchyLevel> {
        self.codes
            .len()
            .checked_sub(1)
            .and_then(HierarchyLevel::from_depth)
    }

    /// Vrai si les cinq niveaux sont spécifiés
    pub fn is_full(&self) -> bool {
        self.codes.len() == HierarchyLevel::COUNT
    }
}

impl fmt::Display for HierarchyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codes.join(":"))
    }
}

impl std::str::FromStr for HierarchyPath {
    type Err = String;

    /// Parse une référence de la forme `provincia:municipio:poligono:parcela:recinto`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codes: Vec<&str> = s.split(':').map(str::trim).collect();
        if codes.is_empty() || codes.len() > HierarchyLevel::COUNT {
            return Err(format!(
                "Invalid cadastral reference: {} (expected 1 to {} colon-separated codes)",
                s,
                HierarchyLevel::COUNT
            ));
        }
        if codes.iter().any(|c| c.is_empty()) {
            return Err(format!("Invalid cadastral reference: {} (empty code)", s));
        }
        Ok(Self::from_codes(codes))
    }
}

/// Boîte englobante en degrés WGS84
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Boîte de taille fixe centrée sur un point (± epsilon degrés)
    pub fn around(lat: f64, lng: f64, epsilon: f64) -> Self {
        Self {
            min_lng: lng - epsilon,
            min_lat: lat - epsilon,
            max_lng: lng + epsilon,
            max_lat: lat + epsilon,
        }
    }
}
