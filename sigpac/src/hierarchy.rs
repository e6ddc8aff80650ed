//! Niveaux de la hiérarchie administrative SIGPAC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Un niveau de la chaîne administrative SIGPAC.
///
/// L'ordre total définit la direction des dépendances : les options d'un
/// niveau ne sont valides que tant que tous les niveaux moins profonds
/// conservent leur code sélectionné. Changer la sélection d'un niveau
/// invalide tous les niveaux strictement plus profonds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Provincia,
    Municipio,
    Poligono,
    Parcela,
    Recinto,
}

impl HierarchyLevel {
    /// Tous les niveaux, du moins profond au plus profond
    pub const ALL: [HierarchyLevel; 5] = [
        HierarchyLevel::Provincia,
        HierarchyLevel::Municipio,
        HierarchyLevel::Poligono,
        HierarchyLevel::Parcela,
        HierarchyLevel::Recinto,
    ];

    /// Nombre de niveaux de la chaîne
    pub const COUNT: usize = 5;

    /// Profondeur du niveau (0 pour Provincia, 4 pour Recinto)
    pub fn depth(self) -> usize {
        self as usize
    }

    /// Niveau à une profondeur donnée
    pub fn from_depth(depth: usize) -> Option<Self> {
        Self::ALL.get(depth).copied()
    }

    /// Niveau parent (None pour Provincia)
    pub fn parent(self) -> Option<Self> {
        self.depth().checked_sub(1).and_then(Self::from_depth)
    }

    /// Niveau enfant (None pour Recinto)
    pub fn child(self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    /// Nom de la couche correspondante du service de consultation
    pub fn layer(self) -> &'static str {
        match self {
            HierarchyLevel::Provincia => "provincias",
            HierarchyLevel::Municipio => "municipios",
            HierarchyLevel::Poligono => "poligonos",
            HierarchyLevel::Parcela => "parcelas",
            HierarchyLevel::Recinto => "recintos",
        }
    }

    /// Nom du niveau au singulier (clé d'attribut dans les réponses)
    pub fn name(self) -> &'static str {
        match self {
            HierarchyLevel::Provincia => "provincia",
            HierarchyLevel::Municipio => "municipio",
            HierarchyLevel::Poligono => "poligono",
            HierarchyLevel::Parcela => "parcela",
            HierarchyLevel::Recinto => "recinto",
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HierarchyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provincia" | "provincias" => Ok(HierarchyLevel::Provincia),
            "municipio" | "municipios" => Ok(HierarchyLevel::Municipio),
            "poligono" | "poligonos" => Ok(HierarchyLevel::Poligono),
            "parcela" | "parcelas" => Ok(HierarchyLevel::Parcela),
            "recinto" | "recintos" => Ok(HierarchyLevel::Recinto),
            _ => Err(format!(
                "Unknown hierarchy level: {}. Use: provincia, municipio, poligono, parcela, recinto",
                s
            )),
        }
    }
}
