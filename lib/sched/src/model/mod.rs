use std::fmt;
use std::str::FromStr;

use crate::data::{BusId, PassengerId, Terminal, Time};
use crate::window::PassengerWindow;
use crate::Map;

mod build;
mod eval;

pub use build::build;
pub use eval::Violation;

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// How passenger assignment indicators are indexed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AssignmentStrategy {
    /// One indicator per (passenger, slot); the decoder picks buses.
    Pooled,
    /// One indicator per (passenger, slot, bus).
    PerBus,
}

/// How an assignment is tied to its board time and penalised.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LinkingStrategy {
    /// Assignment domains are the boarding windows; penalties sit on the indicators.
    Window,
    /// Domains run to the last departure slot; continuous board-time and wait variables are
    /// tied to the indicators with big-M rows and the wait is capped by a constraint.
    BigM,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WaitPenalty {
    Linear,
    Quadratic,
}

impl WaitPenalty {
    #[inline]
    pub fn cost(self, wait: Time) -> f64 {
        let w = wait as f64;
        match self {
            WaitPenalty::Linear => w,
            WaitPenalty::Quadratic => w * w,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HeadwayMode {
    /// No two departures from one terminal, by any buses, within `min_headway` slots.
    Pooled,
    /// As `Pooled`, but only departures of the same bus are compared.
    PerBus,
    Disabled,
}

pub const ASSIGNMENT_STRINGS: [&str; 2] = ["pooled", "per-bus"];
pub const LINKING_STRINGS: [&str; 2] = ["window", "big-m"];
pub const PENALTY_STRINGS: [&str; 2] = ["linear", "quadratic"];
pub const HEADWAY_STRINGS: [&str; 3] = ["pooled", "per-bus", "off"];

macro_rules! string_options {
    ($t:ty { $($s:literal => $v:expr),+ $(,)? }) => {
        impl FromStr for $t {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($v),)+
                    _ => Err(format!("invalid string: {}", s)),
                }
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                $(if *self == $v { return f.write_str($s); })+
                unreachable!()
            }
        }
    };
}

string_options!(AssignmentStrategy { "pooled" => AssignmentStrategy::Pooled, "per-bus" => AssignmentStrategy::PerBus });
string_options!(LinkingStrategy { "window" => LinkingStrategy::Window, "big-m" => LinkingStrategy::BigM });
string_options!(WaitPenalty { "linear" => WaitPenalty::Linear, "quadratic" => WaitPenalty::Quadratic });
string_options!(HeadwayMode { "pooled" => HeadwayMode::Pooled, "per-bus" => HeadwayMode::PerBus, "off" => HeadwayMode::Disabled });

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ModelOptions {
    pub assignment: AssignmentStrategy,
    pub linking: LinkingStrategy,
    pub penalty: WaitPenalty,
    pub headway: HeadwayMode,
    /// Width of the headway window, in slots.
    pub min_headway: Time,
}

impl Default for ModelOptions {
    fn default() -> Self {
        ModelOptions {
            assignment: AssignmentStrategy::Pooled,
            linking: LinkingStrategy::Window,
            penalty: WaitPenalty::Linear,
            headway: HeadwayMode::Pooled,
            min_headway: 3,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Variables and rows
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarId(pub(crate) u32);

impl VarId {
    #[inline(always)]
    pub fn index(self) -> usize { self.0 as usize }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum VarDomain {
    Binary,
    Continuous { lb: f64, ub: f64 },
}

/// What a variable stands for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VarKey {
    /// Passenger boards at `t` (on `bus`, under per-bus assignment).
    Assign { terminal: Terminal, passenger: PassengerId, t: Time, bus: Option<BusId> },
    Depart { terminal: Terminal, t: Time, bus: BusId },
    Avail { terminal: Terminal, t: Time, bus: BusId },
    BoardTime { terminal: Terminal, passenger: PassengerId },
    Wait { terminal: Terminal, passenger: PassengerId },
    /// Epigraph of the squared wait.
    WaitCost { terminal: Terminal, passenger: PassengerId },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Variable {
    pub key: VarKey,
    pub domain: VarDomain,
}

/// `sum coef * var + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self { LinExpr::default() }

    #[inline]
    pub fn add(&mut self, var: VarId, coef: f64) -> &mut Self {
        self.terms.push((var, coef));
        self
    }

    pub fn with(mut self, var: VarId, coef: f64) -> Self {
        self.add(var, coef);
        self
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * values[v.index()]).sum::<f64>() + self.constant
    }
}

impl FromIterator<(VarId, f64)> for LinExpr {
    fn from_iter<I: IntoIterator<Item=(VarId, f64)>>(iter: I) -> Self {
        LinExpr { terms: iter.into_iter().collect(), constant: 0.0 }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Eq => "==",
            Sense::Ge => ">=",
        })
    }
}

/// Which group of rows a constraint belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Family {
    ExactlyOne,
    Capacity,
    DepartRequiresAvail,
    ExclusiveAvail,
    ExclusiveDepart,
    Flow,
    DayStart,
    TransitTail,
    Headway,
    BoardTimeLink,
    WaitDefinition,
    WaitCap,
    WaitCostEpigraph,
}

/// `expr <sense> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub family: Family,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AssignVar {
    pub t: Time,
    pub bus: Option<BusId>,
    pub var: VarId,
}

// ------------------------------------------------------------------------------------------------
// Model
// ------------------------------------------------------------------------------------------------

/// A mixed-integer linear program over the time-expanded terminal x bus x time graph, plus the
/// index maps needed to read a solution back.  Built by [`build`], never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Model {
    pub options: ModelOptions,
    pub t_start: Time,
    pub t_end: Time,
    pub vars: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    /// Minimised.
    pub objective: LinExpr,
    pub windows: Vec<PassengerWindow>,
    assign: Map<(Terminal, PassengerId), Vec<AssignVar>>,
    depart: Map<(Terminal, Time, BusId), VarId>,
    avail: Map<(Terminal, Time, BusId), VarId>,
}

impl Model {
    #[inline]
    pub fn num_vars(&self) -> usize { self.vars.len() }

    #[inline]
    pub fn num_constraints(&self) -> usize { self.constraints.len() }

    pub fn var(&self, id: VarId) -> &Variable { &self.vars[id.index()] }

    pub fn depart_var(&self, terminal: Terminal, t: Time, bus: BusId) -> Option<VarId> {
        self.depart.get(&(terminal, t, bus)).copied()
    }

    pub fn avail_var(&self, terminal: Terminal, t: Time, bus: BusId) -> Option<VarId> {
        self.avail.get(&(terminal, t, bus)).copied()
    }

    /// Assignment indicators of a passenger, ordered by slot then bus.
    pub fn assign_vars(&self, terminal: Terminal, passenger: PassengerId) -> &[AssignVar] {
        self.assign.get(&(terminal, passenger)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All departure indicators, keyed by (terminal, slot, bus).
    pub fn depart_vars(&self) -> impl Iterator<Item=((Terminal, Time, BusId), VarId)> + '_ {
        self.depart.iter().map(|(&k, &v)| (k, v))
    }

    pub fn rows_in(&self, family: Family) -> impl Iterator<Item=&Constraint> + '_ {
        self.constraints.iter().filter(move |c| c.family == family)
    }

    pub fn family_sizes(&self) -> Vec<(Family, usize)> {
        let mut sizes: Map<Family, usize> = Map::default();
        for c in &self.constraints {
            *sizes.entry(c.family).or_default() += 1;
        }
        let mut sizes: Vec<_> = sizes.into_iter().collect();
        sizes.sort();
        sizes
    }
}
