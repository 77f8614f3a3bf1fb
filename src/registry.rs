//! Function registry: formula sources, groups, priorities, materialization
//!
//! Formula sources are registered as named modules, each carrying a priority
//! and a list of formulas with explicit signatures and optional group tags.
//! Materialization filters formulas by the active group set, resolves name
//! collisions by priority, and expands every participant through the
//! specializer into the final runnable calculation list.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, warn};

use crate::calc::signature::ClassifiedSignature;
use crate::calc::specialize::{build_cells, CalcCell, ModelData};
use crate::calc::{Calc, FormulaFn, Signature};
use crate::dimension::DimensionRanges;
use crate::error::{ConfigError, MaterializeError};

/// Ranking of formula sources. Higher-priority sources win name collisions;
/// user-defined formulas outrank product-specific ones, which outrank the
/// general library. Equal priority never resolves silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    General,
    Product,
    UserDefined,
}

struct FormulaDef {
    name: String,
    group: Option<String>,
    signature: Signature,
    func: FormulaFn,
}

/// A named formula source: the registration-time analogue of a module of
/// model functions
pub struct FormulaModule {
    name: String,
    priority: Priority,
    formulas: Vec<FormulaDef>,
}

impl FormulaModule {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        FormulaModule {
            name: name.into(),
            priority,
            formulas: Vec::new(),
        }
    }

    /// Add a formula. Formulas without a group tag are helpers: callable from
    /// other formulas through the evaluation context, but never materialized
    /// into the runnable calculation list.
    pub fn formula(
        mut self,
        name: impl Into<String>,
        group: Option<&str>,
        signature: Signature,
        func: FormulaFn,
    ) -> Self {
        self.formulas.push(FormulaDef {
            name: name.into(),
            group: group.map(str::to_owned),
            signature,
            func,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

#[derive(Debug)]
struct RegisteredFormula {
    name: String,
    group: Option<String>,
    func: FormulaFn,
    classified: ClassifiedSignature,
}

#[derive(Debug)]
struct RegisteredModule {
    name: String,
    priority: Priority,
    formulas: Vec<RegisteredFormula>,
}

/// Mutable builder for the calculation set of a run
///
/// Configure modules and active groups, then call
/// [`create_calculations`](CalcRegistry::create_calculations) once per unit
/// of work. Each materialization owns its caches, so worker threads must each
/// materialize their own list rather than sharing one.
#[derive(Debug, Default)]
pub struct CalcRegistry {
    modules: Vec<RegisteredModule>,
    groups: BTreeSet<String>,
}

impl CalcRegistry {
    pub fn new() -> Self {
        CalcRegistry::default()
    }

    /// Register formula source modules. A module re-registered under an
    /// existing name replaces the previous registration. Malformed signatures
    /// and duplicate formula names are rejected here, before any invocation
    /// can observe them.
    pub fn register_modules(
        &mut self,
        modules: impl IntoIterator<Item = FormulaModule>,
    ) -> Result<&mut Self, ConfigError> {
        // Validate everything before touching the registry, so a rejected
        // batch leaves no partial registration behind
        let mut staged = Vec::new();
        for module in modules {
            let mut registered = Vec::with_capacity(module.formulas.len());
            for def in &module.formulas {
                if module
                    .formulas
                    .iter()
                    .filter(|other| other.name == def.name)
                    .count()
                    > 1
                {
                    return Err(ConfigError::DuplicateFormula {
                        module: module.name.clone(),
                        formula: def.name.clone(),
                    });
                }
                registered.push(RegisteredFormula {
                    name: def.name.clone(),
                    group: def.group.clone(),
                    func: def.func,
                    classified: def.signature.classify(&def.name)?,
                });
            }
            staged.push(RegisteredModule {
                name: module.name,
                priority: module.priority,
                formulas: registered,
            });
        }

        for module in staged {
            self.modules.retain(|existing| existing.name != module.name);
            self.modules.push(module);
        }
        Ok(self)
    }

    /// Deregister modules by name
    pub fn remove_modules(
        &mut self,
        names: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> &mut Self {
        let names: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_owned()).collect();
        self.modules.retain(|module| !names.contains(&module.name));
        self
    }

    /// Activate function groups for subsequent materializations
    pub fn register_function_groups(
        &mut self,
        groups: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Deactivate function groups
    pub fn remove_function_groups(
        &mut self,
        groups: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> &mut Self {
        for group in groups {
            self.groups.remove(group.as_ref());
        }
        self
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn function_groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Materialize the runnable calculation list for the given dimension
    /// ranges. `cache_size` bounds every produced calc's memoization cache;
    /// `None` leaves them unbounded.
    ///
    /// Formulas tagged with an inactive group do not participate at all.
    /// Untagged helpers participate in by-name dispatch but are not returned.
    /// Name collisions among participants resolve to the highest-priority
    /// source; an equal-priority collision is a configuration error.
    pub fn create_calculations(
        &self,
        ranges: &DimensionRanges,
        cache_size: Option<usize>,
    ) -> Result<Vec<Calc>, MaterializeError> {
        struct Participant<'a> {
            module: &'a str,
            priority: Priority,
            formula: &'a RegisteredFormula,
        }

        let mut participants: BTreeMap<&str, Participant<'_>> = BTreeMap::new();
        for module in &self.modules {
            for formula in &module.formulas {
                let participates = formula
                    .group
                    .as_ref()
                    .map_or(true, |group| self.groups.contains(group));
                if !participates {
                    continue;
                }
                match participants.entry(formula.name.as_str()) {
                    Entry::Vacant(vacant) => {
                        vacant.insert(Participant {
                            module: &module.name,
                            priority: module.priority,
                            formula,
                        });
                    }
                    Entry::Occupied(mut occupied) => {
                        let existing = occupied.get();
                        if module.priority == existing.priority {
                            return Err(ConfigError::PriorityConflict {
                                formula: formula.name.clone(),
                                first: existing.module.to_owned(),
                                second: module.name.clone(),
                            }
                            .into());
                        }
                        if module.priority > existing.priority {
                            occupied.insert(Participant {
                                module: &module.name,
                                priority: module.priority,
                                formula,
                            });
                        }
                    }
                }
            }
        }

        let mut calcs: Vec<CalcCell> = Vec::new();
        let mut by_formula: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (name, participant) in &participants {
            let formula = participant.formula;
            // Helpers carry no group; anything tagged here survived the
            // active-group filter above
            let active = formula.group.is_some();

            if !formula.classified.dims.is_empty() && !ranges.has_secondary_ranges() {
                warn!(
                    "formula `{name}` declares secondary axes but no secondary ranges were \
                     supplied; materializing the unspecialized template"
                );
            }

            let cells = build_cells(
                name,
                participant.module,
                formula.group.as_deref(),
                active,
                formula.func,
                &formula.classified,
                ranges,
                cache_size,
            )?;
            let start = calcs.len();
            by_formula.insert((*name).to_owned(), (start..start + cells.len()).collect());
            calcs.extend(cells);
        }

        let model = Rc::new(ModelData { calcs, by_formula });
        let materialized: Vec<Calc> = (0..model.calcs.len())
            .filter(|&idx| model.calcs[idx].active)
            .map(|idx| Calc {
                model: Rc::clone(&model),
                idx,
            })
            .collect();

        debug!(
            "materialized {} calculations ({} cells) from {} formulas",
            materialized.len(),
            model.calcs.len(),
            participants.len()
        );

        Ok(materialized)
    }
}
