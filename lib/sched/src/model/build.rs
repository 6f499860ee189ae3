use itertools::Itertools;
use tracing::*;

use super::*;
use crate::Error;
use crate::data::{ConfigError, InitialPlacement, ShuttleInstance};
use crate::window::Windows;

struct Builder<'a> {
    instance: &'a ShuttleInstance,
    options: &'a ModelOptions,
    model: Model,
    /// Indicators boarding at (terminal, t, bus), bus `None` under pooled assignment.
    boarding: Map<(Terminal, Time, Option<BusId>), Vec<VarId>>,
}

impl<'a> Builder<'a> {
    fn new(instance: &'a ShuttleInstance, windows: &Windows, options: &'a ModelOptions) -> Self {
        let model = Model {
            options: *options,
            t_start: instance.t_start,
            t_end: instance.t_end,
            vars: Vec::new(),
            constraints: Vec::new(),
            objective: LinExpr::new(),
            windows: windows.iter().copied().collect(),
            assign: Map::default(),
            depart: Map::default(),
            avail: Map::default(),
        };
        Builder { instance, options, model, boarding: Map::default() }
    }

    fn add_var(&mut self, key: VarKey, domain: VarDomain) -> VarId {
        let id = VarId(self.model.vars.len() as u32);
        self.model.vars.push(Variable { key, domain });
        id
    }

    fn add_row(&mut self, family: Family, expr: LinExpr, sense: Sense, rhs: f64) {
        self.model.constraints.push(Constraint { family, expr, sense, rhs });
    }

    #[inline]
    fn depart(&self, terminal: Terminal, t: Time, bus: BusId) -> VarId {
        self.model.depart[&(terminal, t, bus)]
    }

    #[inline]
    fn avail(&self, terminal: Terminal, t: Time, bus: BusId) -> VarId {
        self.model.avail[&(terminal, t, bus)]
    }

    fn bus_states(&mut self) {
        let inst = self.instance;
        for &bus in &inst.buses {
            for t in inst.horizon() {
                for terminal in Terminal::ALL {
                    let d = self.add_var(VarKey::Depart { terminal, t, bus }, VarDomain::Binary);
                    let a = self.add_var(VarKey::Avail { terminal, t, bus }, VarDomain::Binary);
                    self.model.depart.insert((terminal, t, bus), d);
                    self.model.avail.insert((terminal, t, bus), a);
                }
            }
        }
    }

    fn assignment(&mut self) {
        let last_departure = self.instance.last_departure();
        let buses = match self.options.assignment {
            AssignmentStrategy::Pooled => vec![None],
            AssignmentStrategy::PerBus => self.instance.buses.iter().map(|&b| Some(b)).collect(),
        };

        for k in 0..self.model.windows.len() {
            let pw = self.model.windows[k];
            let (terminal, passenger) = (pw.passenger.terminal, pw.passenger.id);
            let slots = match self.options.linking {
                LinkingStrategy::Window => pw.window.iter(),
                LinkingStrategy::BigM => pw.window.lo..=last_departure,
            };
            let mut vars = Vec::with_capacity(slots.size_hint().0 * buses.len());
            for t in slots {
                for &bus in &buses {
                    let var = self.add_var(VarKey::Assign { terminal, passenger, t, bus }, VarDomain::Binary);
                    self.boarding.entry((terminal, t, bus)).or_default().push(var);
                    vars.push(AssignVar { t, bus, var });
                }
            }

            let exactly_one = vars.iter().map(|a| (a.var, 1.0)).collect();
            self.add_row(Family::ExactlyOne, exactly_one, Sense::Eq, 1.0);
            self.model.assign.insert((terminal, passenger), vars);
        }
    }

    fn capacity(&mut self) {
        let c_max = self.instance.capacity as f64;
        let keys = self.boarding.keys().copied().sorted().collect_vec();
        for key @ (terminal, t, bus) in keys {
            let mut expr: LinExpr = self.boarding[&key].iter().map(|&x| (x, 1.0)).collect();
            match bus {
                None => {
                    for &b in &self.instance.buses {
                        expr.add(self.depart(terminal, t, b), -c_max);
                    }
                }
                Some(b) => { expr.add(self.depart(terminal, t, b), -c_max); }
            }
            self.add_row(Family::Capacity, expr, Sense::Le, 0.0);
        }
    }

    fn bus_state_rows(&mut self) {
        let inst = self.instance;
        for &bus in &inst.buses {
            for t in inst.horizon() {
                for terminal in Terminal::ALL {
                    let expr = LinExpr::new()
                        .with(self.depart(terminal, t, bus), 1.0)
                        .with(self.avail(terminal, t, bus), -1.0);
                    self.add_row(Family::DepartRequiresAvail, expr, Sense::Le, 0.0);
                }
                let avail = LinExpr::new()
                    .with(self.avail(Terminal::Cei, t, bus), 1.0)
                    .with(self.avail(Terminal::T2, t, bus), 1.0);
                self.add_row(Family::ExclusiveAvail, avail, Sense::Le, 1.0);
                let depart = LinExpr::new()
                    .with(self.depart(Terminal::Cei, t, bus), 1.0)
                    .with(self.depart(Terminal::T2, t, bus), 1.0);
                self.add_row(Family::ExclusiveDepart, depart, Sense::Le, 1.0);
            }
        }
    }

    /// `avail(x, t+1) = avail(x, t) - depart(x, t) + depart(other(x), t+1-tau)`
    fn flow(&mut self) {
        let inst = self.instance;
        for &bus in &inst.buses {
            for t in inst.t_start..inst.t_end {
                for terminal in Terminal::ALL {
                    let mut expr = LinExpr::new()
                        .with(self.avail(terminal, t + 1, bus), 1.0)
                        .with(self.avail(terminal, t, bus), -1.0)
                        .with(self.depart(terminal, t, bus), 1.0);
                    let left = t + 1 - inst.tau;
                    if left >= inst.t_start {
                        expr.add(self.depart(terminal.other(), left, bus), -1.0);
                    }
                    self.add_row(Family::Flow, expr, Sense::Eq, 0.0);
                }
            }
        }
    }

    fn day_start(&mut self) {
        let inst = self.instance;
        let t0 = inst.t_start;
        if let InitialPlacement::AtCei(count) = inst.initial_placement {
            for (terminal, n) in [(Terminal::Cei, count), (Terminal::T2, (inst.buses.len() as u32).saturating_sub(count))] {
                let expr = inst.buses.iter().map(|&bus| (self.avail(terminal, t0, bus), 1.0)).collect();
                self.add_row(Family::DayStart, expr, Sense::Eq, n as f64);
            }
        }
        for &bus in &inst.buses {
            match inst.initial_placement.fixed(bus) {
                None => {
                    let expr = LinExpr::new()
                        .with(self.avail(Terminal::Cei, t0, bus), 1.0)
                        .with(self.avail(Terminal::T2, t0, bus), 1.0);
                    self.add_row(Family::DayStart, expr, Sense::Eq, 1.0);
                }
                Some(terminal) => {
                    let here = LinExpr::new().with(self.avail(terminal, t0, bus), 1.0);
                    self.add_row(Family::DayStart, here, Sense::Eq, 1.0);
                    let there = LinExpr::new().with(self.avail(terminal.other(), t0, bus), 1.0);
                    self.add_row(Family::DayStart, there, Sense::Eq, 0.0);
                }
            }
        }
    }

    fn transit_tail(&mut self) {
        let inst = self.instance;
        for t in (inst.last_departure() + 1).max(inst.t_start)..=inst.t_end {
            for &bus in &inst.buses {
                for terminal in Terminal::ALL {
                    let expr = LinExpr::new().with(self.depart(terminal, t, bus), 1.0);
                    self.add_row(Family::TransitTail, expr, Sense::Eq, 0.0);
                }
            }
        }
    }

    /// At most one departure in every run of `min_headway` consecutive slots.
    fn headway(&mut self) {
        let inst = self.instance;
        let h = self.options.min_headway;
        let per_bus = match self.options.headway {
            HeadwayMode::Disabled => return,
            _ if h <= 1 && self.options.headway == HeadwayMode::PerBus => return,
            _ if h < 1 => return,
            HeadwayMode::Pooled => false,
            HeadwayMode::PerBus => true,
        };

        let last_start = inst.t_start.max(inst.t_end - h + 1);
        for s in inst.t_start..=last_start {
            let slots = s..=(s + h - 1).min(inst.t_end);
            for terminal in Terminal::ALL {
                if per_bus {
                    for &bus in &inst.buses {
                        let expr = slots.clone().map(|t| (self.depart(terminal, t, bus), 1.0)).collect();
                        self.add_row(Family::Headway, expr, Sense::Le, 1.0);
                    }
                } else {
                    let expr = slots.clone()
                        .cartesian_product(&inst.buses)
                        .map(|(t, &bus)| (self.depart(terminal, t, bus), 1.0))
                        .collect();
                    self.add_row(Family::Headway, expr, Sense::Le, 1.0);
                }
            }
        }
    }

    fn objective(&mut self) {
        match self.options.linking {
            LinkingStrategy::Window => self.window_objective(),
            LinkingStrategy::BigM => self.big_m_objective(),
        }
    }

    fn window_objective(&mut self) {
        let penalty = self.options.penalty;
        for pw in &self.model.windows {
            let key = (pw.passenger.terminal, pw.passenger.id);
            for a in &self.model.assign[&key] {
                let cost = penalty.cost(a.t - pw.passenger.arrival);
                if cost != 0.0 {
                    self.model.objective.add(a.var, cost);
                }
            }
        }
    }

    /// Board time `D >= t - M (1 - x_t)` for every indicator, wait `s >= D - a`, `s <= w_max`.
    /// Quadratic penalties use the secants of `s^2` between consecutive integers, which are
    /// exact at integral waits.
    fn big_m_objective(&mut self) {
        let inst = self.instance;
        let big_m = (inst.t_end - inst.t_start) as f64;
        let span = inst.t_end - inst.t_start;

        for k in 0..self.model.windows.len() {
            let p = self.model.windows[k].passenger;
            let (terminal, passenger) = (p.terminal, p.id);
            let board = self.add_var(
                VarKey::BoardTime { terminal, passenger },
                VarDomain::Continuous { lb: inst.t_start as f64, ub: inst.t_end as f64 },
            );
            let wait = self.add_var(
                VarKey::Wait { terminal, passenger },
                VarDomain::Continuous { lb: 0.0, ub: span as f64 },
            );

            let links = self.model.assign[&(terminal, passenger)].iter()
                .map(|a| (a.var, a.t))
                .collect_vec();
            for (x, t) in links {
                let expr = LinExpr::new().with(board, 1.0).with(x, -big_m);
                self.add_row(Family::BoardTimeLink, expr, Sense::Ge, t as f64 - big_m);
            }
            let def = LinExpr::new().with(wait, 1.0).with(board, -1.0);
            self.add_row(Family::WaitDefinition, def, Sense::Ge, -(p.arrival as f64));
            self.add_row(Family::WaitCap, LinExpr::new().with(wait, 1.0), Sense::Le, inst.w_max as f64);

            match self.options.penalty {
                WaitPenalty::Linear => { self.model.objective.add(wait, 1.0); }
                WaitPenalty::Quadratic => {
                    let cost = self.add_var(
                        VarKey::WaitCost { terminal, passenger },
                        VarDomain::Continuous { lb: 0.0, ub: (span * span) as f64 },
                    );
                    for j in 0..inst.w_max {
                        let expr = LinExpr::new().with(cost, 1.0).with(wait, -((2 * j + 1) as f64));
                        self.add_row(Family::WaitCostEpigraph, expr, Sense::Ge, -((j * (j + 1)) as f64));
                    }
                    self.model.objective.add(cost, 1.0);
                }
            }
        }
    }
}

/// Assemble the full program for `instance`.  `windows` must come from
/// [`compute_windows`](crate::window::compute_windows) on the same instance.
#[instrument(level="info", skip_all, fields(instance=%instance.id))]
pub fn build(instance: &ShuttleInstance, windows: &Windows, options: &ModelOptions) -> Result<Model, Error> {
    if instance.t_end < instance.tau {
        return Err(ConfigError::HorizonTooShort { t_end: instance.t_end, tau: instance.tau }.into());
    }

    let mut b = Builder::new(instance, windows, options);
    b.bus_states();
    b.assignment();
    b.capacity();
    b.bus_state_rows();
    b.flow();
    b.day_start();
    b.transit_tail();
    b.headway();
    b.objective();

    let model = b.model;
    info!(vars=model.num_vars(), rows=model.num_constraints(), ?options, "model built");
    for (family, n) in model.family_sizes() {
        debug!(?family, n);
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scenario;
    use crate::window::compute_windows;

    fn build_with(instance: &ShuttleInstance, options: ModelOptions) -> Model {
        let windows = compute_windows(instance).unwrap();
        build(instance, &windows, &options).unwrap()
    }

    fn count(model: &Model, family: Family) -> usize { model.rows_in(family).count() }

    #[test]
    fn scenario_sizes() {
        let inst = scenario();
        let model = build_with(&inst, ModelOptions::default());
        // 9 slots x 2 terminals x 1 bus, depart + avail
        let bus_vars = 9 * 2 * 2;
        assert_eq!(model.num_vars(), bus_vars + 7 + 7 + 5);
        assert_eq!(count(&model, Family::ExactlyOne), 3);
        assert_eq!(count(&model, Family::Flow), 8 * 2);
        assert_eq!(count(&model, Family::DayStart), 1);
        // slots 7 and 8 at both terminals
        assert_eq!(count(&model, Family::TransitTail), 4);
        // window starts 0..=6, both terminals
        assert_eq!(count(&model, Family::Headway), 7 * 2);
        assert_eq!(model.assign_vars(Terminal::T2, 1).len(), 5);
        assert!(model.assign_vars(Terminal::T2, 2).is_empty());
    }

    #[test]
    fn flow_rows_shift_by_tau() {
        let inst = scenario();
        let model = build_with(&inst, ModelOptions::default());
        let d = model.depart_var(Terminal::T2, 2, 1).unwrap();
        let a4 = model.avail_var(Terminal::Cei, 4, 1).unwrap();
        // the row producing avail(CEI, 4) pulls in depart(T2, 2)
        let row = model.rows_in(Family::Flow)
            .find(|c| c.expr.terms.contains(&(a4, 1.0)))
            .unwrap();
        assert!(row.expr.terms.contains(&(d, -1.0)));
        // the first tau - 1 rows have no incoming leg
        let a1 = model.avail_var(Terminal::Cei, 1, 1).unwrap();
        let row = model.rows_in(Family::Flow)
            .find(|c| c.expr.terms.contains(&(a1, 1.0)))
            .unwrap();
        assert_eq!(row.expr.terms.len(), 3);
    }

    #[test]
    fn per_bus_assignment() {
        let mut inst = scenario();
        inst.buses = vec![1, 2];
        let options = ModelOptions { assignment: AssignmentStrategy::PerBus, ..ModelOptions::default() };
        let model = build_with(&inst, options);
        let vars = model.assign_vars(Terminal::Cei, 1);
        assert_eq!(vars.len(), 7 * 2);
        assert!(vars.iter().all(|a| a.bus.is_some()));
        // one capacity row per (terminal, slot, bus) with an indicator
        assert_eq!(count(&model, Family::Capacity), (7 + 5) * 2);
        assert!(model.rows_in(Family::Capacity).all(|c| c.expr.terms.iter().filter(|(_, k)| *k < 0.0).count() == 1));
    }

    #[test]
    fn headway_modes() {
        let mut inst = scenario();
        inst.buses = vec![1, 2];
        let pooled = build_with(&inst, ModelOptions::default());
        assert!(pooled.rows_in(Family::Headway).all(|c| c.expr.terms.len() == 3 * 2));

        let per_bus = build_with(&inst, ModelOptions { headway: HeadwayMode::PerBus, ..ModelOptions::default() });
        assert_eq!(count(&per_bus, Family::Headway), 7 * 2 * 2);
        assert!(per_bus.rows_in(Family::Headway).all(|c| c.expr.terms.len() == 3));

        let off = build_with(&inst, ModelOptions { headway: HeadwayMode::Disabled, ..ModelOptions::default() });
        assert_eq!(count(&off, Family::Headway), 0);

        let wide = build_with(&inst, ModelOptions { min_headway: 20, ..ModelOptions::default() });
        // a single window covering the horizon
        assert_eq!(count(&wide, Family::Headway), 2);
    }

    #[test]
    fn fixed_initial_positions() {
        let text = r#"{"T": 8, "B": 2, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {},
                       "initial_positions": [{"bus": 1, "terminal": "T2"}, {"bus": 2, "terminal": "CEI"}]}"#;
        let inst = ShuttleInstance::from_json_str(text, "fixed").unwrap();
        let model = build_with(&inst, ModelOptions::default());
        let rows = model.rows_in(Family::DayStart).collect_vec();
        assert_eq!(rows.len(), 4);
        let fixed_one = model.avail_var(Terminal::T2, 0, 1).unwrap();
        assert!(rows.iter().any(|c| c.expr.terms == vec![(fixed_one, 1.0)] && c.rhs == 1.0));
        let barred = model.avail_var(Terminal::T2, 0, 2).unwrap();
        assert!(rows.iter().any(|c| c.expr.terms == vec![(barred, 1.0)] && c.rhs == 0.0));
    }

    #[test]
    fn counted_initial_positions() {
        let text = r#"{"T": 8, "B": 3, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {}, "initial_at_cei": 2}"#;
        let inst = ShuttleInstance::from_json_str(text, "counted").unwrap();
        let model = build_with(&inst, ModelOptions::default());
        let rows = model.rows_in(Family::DayStart).collect_vec();
        // one row per terminal, then every bus at exactly one terminal
        assert_eq!(rows.len(), 2 + 3);
        let at = |terminal| (1..=3).map(|b| (model.avail_var(terminal, 0, b).unwrap(), 1.0)).collect_vec();
        assert!(rows.iter().any(|c| c.expr.terms == at(Terminal::Cei) && c.sense == Sense::Eq && c.rhs == 2.0));
        assert!(rows.iter().any(|c| c.expr.terms == at(Terminal::T2) && c.sense == Sense::Eq && c.rhs == 1.0));
    }

    #[test]
    fn window_objective_coefficients() {
        let inst = scenario();
        let lin = build_with(&inst, ModelOptions::default());
        let quad = build_with(&inst, ModelOptions { penalty: WaitPenalty::Quadratic, ..ModelOptions::default() });
        let x = lin.assign_vars(Terminal::T2, 1).iter().find(|a| a.t == 5).unwrap().var;
        assert!(lin.objective.terms.contains(&(x, 3.0)));
        let x = quad.assign_vars(Terminal::T2, 1).iter().find(|a| a.t == 5).unwrap().var;
        assert!(quad.objective.terms.contains(&(x, 9.0)));
    }

    #[test]
    fn big_m_structure() {
        let text = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 2, "arrivals": {"CEI": {"1": 1}}}"#;
        let inst = ShuttleInstance::from_json_str(text, "bigm").unwrap();
        let options = ModelOptions { linking: LinkingStrategy::BigM, penalty: WaitPenalty::Quadratic, ..ModelOptions::default() };
        let model = build_with(&inst, options);
        // domain runs past the window up to the last departure
        assert_eq!(model.assign_vars(Terminal::Cei, 1).len(), 6);
        assert_eq!(count(&model, Family::BoardTimeLink), 6);
        assert_eq!(count(&model, Family::WaitDefinition), 1);
        assert_eq!(count(&model, Family::WaitCap), 1);
        assert_eq!(count(&model, Family::WaitCostEpigraph), 2);
        assert_eq!(model.objective.terms.len(), 1);
        assert!(model.vars.iter().any(|v| matches!(v.key, VarKey::WaitCost { .. })));
    }
}
