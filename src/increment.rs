use {
    crate::{geometry::Geometry, variables::VariableSet},
    chrono::{DateTime, Utc},
    ndarray::Array2,
    rayon::prelude::*,
    std::{fmt, ops::AddAssign},
};

/// A single named field: horizontal points (flattened) by vertical levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    data: Array2<f64>,
}

impl Field {
    pub fn new(name: impl Into<String>, data: Array2<f64>) -> Self {
        Field {
            name: name.into(),
            data,
        }
    }

    pub fn zeros(name: impl Into<String>, geom: &Geometry) -> Self {
        Field::new(name, Array2::zeros(geom.field_shape()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }
}

/// A mutable, named view of an increment's field values.
///
/// Owned buffers only; merging back into an increment validates name
/// membership and shape, so edits can never widen the increment's variable
/// set by accident.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    /// Reshapes the set to exactly `vars`, in `vars` order. Existing fields
    /// keep their values, newly declared ones are zero-initialized on
    /// `geom`, and fields not in `vars` are dropped.
    pub fn declare(&mut self, vars: &VariableSet, geom: &Geometry) {
        let mut fields = Vec::with_capacity(vars.len());
        for name in vars.iter() {
            match self.fields.iter().position(|f| f.name() == name) {
                Some(i) => fields.push(self.fields.swap_remove(i)),
                None => fields.push(Field::zeros(name, geom)),
            }
        }
        self.fields = fields;
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A gridded perturbation dataset: one rank-2 field per declared variable,
/// on a single geometry, tagged with a valid date.
#[derive(Debug, Clone, PartialEq)]
pub struct Increment {
    geom: Geometry,
    vars: VariableSet,
    date: DateTime<Utc>,
    fields: Vec<Field>,
}

impl Increment {
    pub fn zeros(geom: &Geometry, vars: &VariableSet, date: DateTime<Utc>) -> Self {
        let fields = vars.iter().map(|name| Field::zeros(name, geom)).collect();
        Increment {
            geom: geom.clone(),
            vars: vars.clone(),
            date,
            fields,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    pub fn variables(&self) -> &VariableSet {
        &self.vars
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn field(&self, name: &str) -> Option<&Array2<f64>> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .map(Field::values)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Overwrites a declared field's values. The variable must already be
    /// declared and the data must match the geometry's field shape.
    pub fn set_field(&mut self, name: &str, data: Array2<f64>) {
        assert_eq!(
            data.dim(),
            self.geom.field_shape(),
            "field `{}` does not match the geometry",
            name
        );
        let slot = self
            .fields
            .iter_mut()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("field `{}` is not declared on this increment", name));
        *slot.values_mut() = data;
    }

    /// Reshapes the declared variables to exactly `vars`; newly declared
    /// fields are zero-filled, fields not in `vars` are dropped.
    pub fn update_fields(&mut self, vars: &VariableSet) {
        let mut fs = self.to_fieldset();
        fs.declare(vars, &self.geom);
        self.vars = vars.clone();
        self.fields = fs.fields;
    }

    pub fn to_fieldset(&self) -> FieldSet {
        FieldSet {
            fields: self.fields.clone(),
        }
    }

    /// Writes a field set's values back. Every field must already be
    /// declared with an unchanged shape; the variable set never widens.
    pub fn merge_fieldset(&mut self, fs: &FieldSet) {
        for field in fs.iter() {
            let slot = self
                .fields
                .iter_mut()
                .find(|f| f.name() == field.name())
                .unwrap_or_else(|| {
                    panic!("field `{}` is not declared on this increment", field.name())
                });
            assert_eq!(
                slot.values().dim(),
                field.values().dim(),
                "field `{}` changed shape",
                field.name()
            );
            *slot.values_mut() = field.values().clone();
        }
    }

    /// Copy onto another geometry, resampling each field horizontally.
    /// Vertical levels must match.
    pub fn change_resolution(&self, target: &Geometry) -> Increment {
        assert_eq!(
            self.geom.levels(),
            target.levels(),
            "vertical levels must match across geometries"
        );
        if *target == self.geom {
            return self.clone();
        }
        let fields = self
            .fields
            .par_iter()
            .map(|f| Field::new(f.name(), resample(f.values(), &self.geom, target)))
            .collect();
        Increment {
            geom: target.clone(),
            vars: self.vars.clone(),
            date: self.date,
            fields,
        }
    }
}

impl AddAssign<&Increment> for Increment {
    fn add_assign(&mut self, rhs: &Increment) {
        assert_eq!(
            self.vars, rhs.vars,
            "increment addition requires matching variables"
        );
        assert_eq!(
            self.geom, rhs.geom,
            "increment addition requires matching geometries"
        );
        for (a, b) in self.fields.iter_mut().zip(rhs.fields.iter()) {
            *a.values_mut() += b.values();
        }
    }
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "increment valid at {}",
            self.date.format("%Y-%m-%dT%H:%M:%SZ")
        )?;
        for field in &self.fields {
            let v = field.values();
            let min = v.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let rms = (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
            writeln!(
                f,
                "  {}: min={:.6e} max={:.6e} rms={:.6e}",
                field.name(),
                min,
                max,
                rms
            )?;
        }
        Ok(())
    }
}

/// A background model state used as linearization trajectory. Same storage
/// layout as an increment, exposed read-only.
#[derive(Debug, Clone)]
pub struct State {
    incr: Increment,
}

impl State {
    pub fn new(incr: Increment) -> Self {
        State { incr }
    }

    pub fn geometry(&self) -> &Geometry {
        self.incr.geometry()
    }

    pub fn variables(&self) -> &VariableSet {
        self.incr.variables()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.incr.date()
    }

    pub fn field(&self, name: &str) -> Option<&Array2<f64>> {
        self.incr.field(name)
    }
}

/// Bilinear resampling of one flattened-horizontal field between grids.
fn resample(src: &Array2<f64>, from: &Geometry, to: &Geometry) -> Array2<f64> {
    let mut out = Array2::zeros(to.field_shape());
    for k in 0..to.levels() {
        for j2 in 0..to.ny() {
            let (j0, j1, fy) = bracket(grid_pos(j2, to.ny(), from.ny()), from.ny());
            for i2 in 0..to.nx() {
                let (i0, i1, fx) = bracket(grid_pos(i2, to.nx(), from.nx()), from.nx());
                let p = |i: usize, j: usize| src[[j * from.nx() + i, k]];
                out[[j2 * to.nx() + i2, k]] = (1.0 - fx) * (1.0 - fy) * p(i0, j0)
                    + fx * (1.0 - fy) * p(i1, j0)
                    + (1.0 - fx) * fy * p(i0, j1)
                    + fx * fy * p(i1, j1);
            }
        }
    }
    out
}

fn grid_pos(i: usize, n_to: usize, n_from: usize) -> f64 {
    if n_to > 1 {
        i as f64 * (n_from - 1) as f64 / (n_to - 1) as f64
    } else {
        0.0
    }
}

fn bracket(x: f64, n: usize) -> (usize, usize, f64) {
    if n < 2 {
        return (0, 0, 0.0);
    }
    let i0 = (x.floor() as usize).min(n - 2);
    (i0, i0 + 1, x - i0 as f64)
}
