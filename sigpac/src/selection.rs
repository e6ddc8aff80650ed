//! Chaîne de sélection en cascade sur les cinq niveaux SIGPAC
//!
//! Machine à états pure : les transitions (`set_selection`, `begin_load`,
//! `apply_options`) ne font aucune I/O. Les réponses asynchrones du service
//! sont raccordées via un jeton de génération par niveau : une réponse dont
//! le jeton ne correspond plus à la génération courante du niveau est
//! simplement ignorée (dernier écrivain gagnant).

use tracing::{debug, trace};

use crate::error::SigpacError;
use crate::hierarchy::HierarchyLevel;
use crate::resolver::CadastralLookup;
use crate::types::{HierarchyPath, LevelOption};

/// État d'un niveau de la chaîne
#[derive(Debug, Clone, Default)]
struct LevelState {
    /// Code sélectionné
    selected: Option<String>,
    /// Liste d'options chargée (None = jamais chargée ou invalidée)
    options: Option<Vec<LevelOption>>,
    /// Génération courante ; incrémentée à chaque invalidation ou émission
    /// de requête, pour écarter les réponses obsolètes
    generation: u64,
}

/// Jeton capturé à l'émission d'une requête d'options.
///
/// Porte la génération du niveau au moment de l'émission et les codes des
/// niveaux ancêtres ; la réponse ne sera appliquée que si la génération n'a
/// pas bougé entre temps.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    level: HierarchyLevel,
    generation: u64,
    ancestors: Vec<String>,
}

impl LoadTicket {
    pub fn level(&self) -> HierarchyLevel {
        self.level
    }

    /// Codes des niveaux ancêtres, du moins profond au plus profond
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }
}

/// Issue de l'application d'une réponse d'options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// La liste d'options a été appliquée
    Applied,
    /// Réponse obsolète, ignorée : la génération du niveau a changé entre
    /// l'émission et la réception
    Stale,
}

/// Chaîne de sélection ordonnée provincia → recinto.
///
/// Invariant : pour un niveau L, la liste d'options n'est valide que tant
/// que tous les niveaux moins profonds conservent leur code sélectionné ;
/// un changement au niveau L efface sélection et options de tous les
/// niveaux strictement plus profonds.
#[derive(Debug, Default)]
pub struct SelectionChain {
    levels: [LevelState; HierarchyLevel::COUNT],
}

impl SelectionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code sélectionné d'un niveau
    pub fn selected(&self, level: HierarchyLevel) -> Option<&str> {
        self.levels[level.depth()].selected.as_deref()
    }

    /// Liste d'options courante d'un niveau (None = jamais chargée ou invalidée)
    pub fn options(&self, level: HierarchyLevel) -> Option<&[LevelOption]> {
        self.levels[level.depth()].options.as_deref()
    }

    /// Génération courante d'un niveau
    pub fn generation(&self, level: HierarchyLevel) -> u64 {
        self.levels[level.depth()].generation
    }

    /// Sélectionne un code et invalide en cascade les niveaux plus profonds.
    ///
    /// Les niveaux moins profonds ou égaux ne sont pas touchés (hormis le
    /// code sélectionné de `level` lui-même). Les requêtes d'options encore
    /// en vol pour les niveaux invalidés deviennent obsolètes.
    pub fn set_selection(&mut self, level: HierarchyLevel, code: impl Into<String>) {
        let code = code.into();
        debug!(level = %level, code = %code, "Selection set");
        self.levels[level.depth()].selected = Some(code);
        self.invalidate_deeper_than(level);
    }

    /// Efface la sélection d'un niveau, en invalidant tout ce qui en dépend
    pub fn clear_selection(&mut self, level: HierarchyLevel) {
        debug!(level = %level, "Selection cleared");
        self.levels[level.depth()].selected = None;
        self.invalidate_deeper_than(level);
    }

    fn invalidate_deeper_than(&mut self, level: HierarchyLevel) {
        for state in &mut self.levels[level.depth() + 1..] {
            state.selected = None;
            state.options = None;
            state.generation += 1;
        }
    }

    /// Vrai ssi un recinto est sélectionné
    pub fn is_complete(&self) -> bool {
        self.selected(HierarchyLevel::Recinto).is_some()
    }

    /// Chemin contigu des codes sélectionnés depuis Provincia
    pub fn path(&self) -> HierarchyPath {
        let mut path = HierarchyPath::new();
        for level in HierarchyLevel::ALL {
            match self.selected(level) {
                Some(code) => path.push(code),
                None => break,
            }
        }
        path
    }

    /// Prépare une requête d'options pour un niveau.
    ///
    /// Exige que tous les niveaux ancêtres soient sélectionnés (aucun pour
    /// Provincia). Incrémente la génération du niveau : toute requête
    /// précédente encore en vol pour ce niveau devient obsolète.
    pub fn begin_load(&mut self, level: HierarchyLevel) -> Result<LoadTicket, SigpacError> {
        let mut ancestors = Vec::with_capacity(level.depth());
        for &ancestor in &HierarchyLevel::ALL[..level.depth()] {
            match self.selected(ancestor) {
                Some(code) => ancestors.push(code.to_string()),
                None => {
                    return Err(SigpacError::MissingAncestor {
                        level,
                        missing: ancestor,
                    })
                }
            }
        }

        let state = &mut self.levels[level.depth()];
        state.generation += 1;
        trace!(level = %level, generation = state.generation, "Option load started");
        Ok(LoadTicket {
            level,
            generation: state.generation,
            ancestors,
        })
    }

    /// Applique une réponse d'options si elle est encore d'actualité.
    ///
    /// Une liste vide est un résultat valide : le niveau a alors une liste
    /// d'options vide et les niveaux plus profonds restent effacés.
    pub fn apply_options(
        &mut self,
        ticket: &LoadTicket,
        options: Vec<LevelOption>,
    ) -> LoadOutcome {
        let state = &mut self.levels[ticket.level.depth()];
        if state.generation != ticket.generation {
            debug!(level = %ticket.level, "Stale option response discarded");
            return LoadOutcome::Stale;
        }
        trace!(level = %ticket.level, count = options.len(), "Options applied");
        state.options = Some(options);
        LoadOutcome::Applied
    }

    /// Charge les options d'un niveau via le service de consultation.
    ///
    /// Équivalent à `begin_load` + requête + `apply_options` ; à n'utiliser
    /// que lorsqu'aucune autre transition ne peut s'intercaler pendant la
    /// requête (sinon, piloter les deux moitiés séparément).
    pub async fn load_options<L>(
        &mut self,
        level: HierarchyLevel,
        lookup: &L,
    ) -> Result<LoadOutcome, SigpacError>
    where
        L: CadastralLookup + ?Sized,
    {
        let ticket = self.begin_load(level)?;
        let options = lookup.level_options(level, ticket.ancestors()).await?;
        Ok(self.apply_options(&ticket, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(code: &str) -> LevelOption {
        LevelOption::new(code, format!("Option {code}"))
    }

    #[test]
    fn test_cascade_invalidation() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");
        chain.set_selection(HierarchyLevel::Municipio, "21");
        chain.set_selection(HierarchyLevel::Poligono, "3");
        chain.set_selection(HierarchyLevel::Parcela, "12");
        chain.set_selection(HierarchyLevel::Recinto, "1");

        let ticket = chain.begin_load(HierarchyLevel::Poligono).unwrap();
        chain.apply_options(&ticket, vec![option("3"), option("4")]);

        // Changer le municipio efface tout ce qui est plus profond
        chain.set_selection(HierarchyLevel::Municipio, "22");

        assert_eq!(chain.selected(HierarchyLevel::Provincia), Some("14"));
        assert_eq!(chain.selected(HierarchyLevel::Municipio), Some("22"));
        for level in [
            HierarchyLevel::Poligono,
            HierarchyLevel::Parcela,
            HierarchyLevel::Recinto,
        ] {
            assert_eq!(chain.selected(level), None);
            assert_eq!(chain.options(level), None);
        }
        assert!(!chain.is_complete());
    }

    #[test]
    fn test_shallower_levels_untouched() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");
        let ticket = chain.begin_load(HierarchyLevel::Municipio).unwrap();
        chain.apply_options(&ticket, vec![option("21")]);
        chain.set_selection(HierarchyLevel::Municipio, "21");

        // Sélectionner plus profond ne touche ni la sélection ni les
        // options des niveaux moins profonds
        chain.set_selection(HierarchyLevel::Poligono, "3");
        assert_eq!(chain.selected(HierarchyLevel::Provincia), Some("14"));
        assert_eq!(chain.selected(HierarchyLevel::Municipio), Some("21"));
        assert_eq!(chain.options(HierarchyLevel::Municipio).unwrap().len(), 1);
    }

    #[test]
    fn test_is_complete_iff_recinto_selected() {
        let mut chain = SelectionChain::new();
        assert!(!chain.is_complete());

        chain.set_selection(HierarchyLevel::Provincia, "14");
        chain.set_selection(HierarchyLevel::Municipio, "21");
        chain.set_selection(HierarchyLevel::Poligono, "3");
        chain.set_selection(HierarchyLevel::Parcela, "12");
        assert!(!chain.is_complete());

        chain.set_selection(HierarchyLevel::Recinto, "1");
        assert!(chain.is_complete());
        assert_eq!(chain.path().to_string(), "14:21:3:12:1");

        // Re-sélectionner un parent redescend à incomplet
        chain.set_selection(HierarchyLevel::Provincia, "41");
        assert!(!chain.is_complete());
        assert_eq!(chain.path().to_string(), "41");
    }

    #[test]
    fn test_generation_token_last_writer_wins() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");

        // Deux requêtes successives pour le même niveau : la première est
        // supplantée avant de se terminer
        let first = chain.begin_load(HierarchyLevel::Municipio).unwrap();
        let second = chain.begin_load(HierarchyLevel::Municipio).unwrap();

        // La réponse de la première arrive après coup : ignorée
        assert_eq!(
            chain.apply_options(&first, vec![option("old")]),
            LoadOutcome::Stale
        );
        assert_eq!(chain.options(HierarchyLevel::Municipio), None);

        assert_eq!(
            chain.apply_options(&second, vec![option("21")]),
            LoadOutcome::Applied
        );
        assert_eq!(chain.options(HierarchyLevel::Municipio).unwrap().len(), 1);
    }

    #[test]
    fn test_parent_change_invalidates_in_flight_load() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");
        let ticket = chain.begin_load(HierarchyLevel::Municipio).unwrap();

        // La provincia change pendant que la requête municipios est en vol
        chain.set_selection(HierarchyLevel::Provincia, "41");

        assert_eq!(
            chain.apply_options(&ticket, vec![option("21")]),
            LoadOutcome::Stale
        );
        assert_eq!(chain.options(HierarchyLevel::Municipio), None);
    }

    #[test]
    fn test_begin_load_requires_ancestors() {
        let mut chain = SelectionChain::new();

        // Provincia n'exige aucun ancêtre
        assert!(chain.begin_load(HierarchyLevel::Provincia).is_ok());

        match chain.begin_load(HierarchyLevel::Poligono) {
            Err(SigpacError::MissingAncestor { level, missing }) => {
                assert_eq!(level, HierarchyLevel::Poligono);
                assert_eq!(missing, HierarchyLevel::Provincia);
            }
            other => panic!("expected MissingAncestor, got {other:?}"),
        }

        chain.set_selection(HierarchyLevel::Provincia, "14");
        match chain.begin_load(HierarchyLevel::Poligono) {
            Err(SigpacError::MissingAncestor { missing, .. }) => {
                assert_eq!(missing, HierarchyLevel::Municipio);
            }
            other => panic!("expected MissingAncestor, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_option_list_is_valid() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");
        let ticket = chain.begin_load(HierarchyLevel::Municipio).unwrap();

        assert_eq!(chain.apply_options(&ticket, vec![]), LoadOutcome::Applied);
        assert_eq!(chain.options(HierarchyLevel::Municipio), Some(&[][..]));
        assert_eq!(chain.selected(HierarchyLevel::Municipio), None);
    }

    #[test]
    fn test_ticket_carries_ancestor_codes() {
        let mut chain = SelectionChain::new();
        chain.set_selection(HierarchyLevel::Provincia, "14");
        chain.set_selection(HierarchyLevel::Municipio, "21");
        chain.set_selection(HierarchyLevel::Poligono, "3");

        let ticket = chain.begin_load(HierarchyLevel::Parcela).unwrap();
        assert_eq!(ticket.level(), HierarchyLevel::Parcela);
        assert_eq!(ticket.ancestors(), ["14", "21", "3"]);
    }
}
