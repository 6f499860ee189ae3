use super::*;

/// A row or variable bound broken by a valuation.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Row { index: usize, family: Family, lhs: f64, sense: Sense, rhs: f64 },
    Domain { var: VarId, key: VarKey, value: f64 },
    /// The valuation does not have one entry per variable.
    Length { expected: usize, found: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Row { index, family, lhs, sense, rhs } =>
                write!(f, "row {} ({:?}): {} {} {} does not hold", index, family, lhs, sense, rhs),
            Violation::Domain { var, key, value } =>
                write!(f, "variable {} ({:?}) takes value {} outside its domain", var.index(), key, value),
            Violation::Length { expected, found } =>
                write!(f, "valuation has {} entries for {} variables", found, expected),
        }
    }
}

impl Constraint {
    #[inline]
    pub fn holds(&self, lhs: f64, tol: f64) -> bool {
        match self.sense {
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Ge => lhs >= self.rhs - tol,
            Sense::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

impl VarDomain {
    #[inline]
    pub fn admits(&self, value: f64, tol: f64) -> bool {
        match *self {
            VarDomain::Binary => value.abs() <= tol || (value - 1.0).abs() <= tol,
            VarDomain::Continuous { lb, ub } => lb - tol <= value && value <= ub + tol,
        }
    }
}

impl Model {
    /// Every bound and row broken by `values` (one entry per variable), within `tol`.
    pub fn check(&self, values: &[f64], tol: f64) -> Vec<Violation> {
        if values.len() != self.vars.len() {
            return vec![Violation::Length { expected: self.vars.len(), found: values.len() }];
        }

        let domain = self.vars.iter()
            .zip(values)
            .enumerate()
            .filter(|(_, (v, x))| !v.domain.admits(**x, tol))
            .map(|(k, (v, &value))| Violation::Domain { var: VarId(k as u32), key: v.key, value });

        let rows = self.constraints.iter()
            .enumerate()
            .filter_map(|(index, c)| {
                let lhs = c.expr.eval(values);
                if c.holds(lhs, tol) { None }
                else { Some(Violation::Row { index, family: c.family, lhs, sense: c.sense, rhs: c.rhs }) }
            });

        domain.chain(rows).collect()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.eval(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scenario;
    use crate::window::compute_windows;

    /// The hand-built schedule of the scenario: CEI passenger 1 at 0, T2 passenger 1 at 2, CEI
    /// passenger 2 at 4.
    fn scenario_valuation(model: &Model) -> Vec<f64> {
        let mut values = vec![0.0; model.num_vars()];
        let mut set = |v: Option<VarId>| values[v.unwrap().index()] = 1.0;
        let at_cei = [0, 4];
        let at_t2 = [2, 6, 7, 8];
        for t in at_cei { set(model.avail_var(Terminal::Cei, t, 1)); }
        for t in at_t2 { set(model.avail_var(Terminal::T2, t, 1)); }
        set(model.depart_var(Terminal::Cei, 0, 1));
        set(model.depart_var(Terminal::T2, 2, 1));
        set(model.depart_var(Terminal::Cei, 4, 1));
        for (terminal, p, t) in [(Terminal::Cei, 1, 0), (Terminal::T2, 1, 2), (Terminal::Cei, 2, 4)] {
            set(model.assign_vars(terminal, p).iter().find(|a| a.t == t).map(|a| a.var));
        }
        values
    }

    fn scenario_model() -> Model {
        let inst = scenario();
        build(&inst, &compute_windows(&inst).unwrap(), &ModelOptions::default()).unwrap()
    }

    #[test]
    fn hand_built_schedule_is_feasible() {
        let model = scenario_model();
        let values = scenario_valuation(&model);
        assert_eq!(model.check(&values, 1e-9), vec![]);
        assert_eq!(model.objective_value(&values), 4.0);
    }

    #[test]
    fn teleporting_bus_is_caught() {
        let model = scenario_model();
        let mut values = scenario_valuation(&model);
        // reappear at CEI one slot early
        values[model.avail_var(Terminal::Cei, 3, 1).unwrap().index()] = 1.0;
        let bad = model.check(&values, 1e-9);
        assert!(bad.iter().any(|v| matches!(v, Violation::Row { family: Family::Flow, .. })));
    }

    #[test]
    fn double_assignment_is_caught() {
        let model = scenario_model();
        let mut values = scenario_valuation(&model);
        let x = model.assign_vars(Terminal::Cei, 2).iter().find(|a| a.t == 0).unwrap().var;
        values[x.index()] = 1.0;
        let bad = model.check(&values, 1e-9);
        assert!(bad.iter().any(|v| matches!(v, Violation::Row { family: Family::ExactlyOne, .. })));
        assert!(bad.iter().any(|v| matches!(v, Violation::Row { family: Family::Capacity, .. })));
    }

    #[test]
    fn short_valuation_is_a_violation() {
        let model = scenario_model();
        let mut values = scenario_valuation(&model);
        values.pop();
        assert_eq!(model.check(&values, 1e-9), vec![Violation::Length { expected: model.num_vars(), found: model.num_vars() - 1 }]);
    }

    #[test]
    fn fractional_binary_is_caught() {
        let model = scenario_model();
        let mut values = scenario_valuation(&model);
        values[0] = 0.5;
        assert!(model.check(&values, 1e-9).iter().any(|v| matches!(v, Violation::Domain { .. })));
    }
}
