use {
    crate::{
        config::Config,
        error::{Error, Result},
        geometry::Geometry,
        increment::{Increment, State},
        variables::VariableSet,
    },
    log::{debug, info},
    ndarray::Array2,
    std::collections::HashMap,
};

/// Contract to the linear variable transform engine: linearize about a
/// background trajectory, then apply the tangent-linear operator in place,
/// restricted to a variable set.
pub trait VariableChange {
    fn set_trajectory(&mut self, trajectory: &State, vars: &VariableSet) -> Result<()>;
    fn multiply(&self, incr: &mut Increment, vars: &VariableSet) -> Result<()>;
}

/// Diagonal scaling engine. Each variable is multiplied by its configured
/// coefficient (default 1.0); with `weight by trajectory` set, also
/// elementwise by the trajectory field normalized by its largest magnitude.
pub struct TrajectoryScale {
    geom: Geometry,
    coefficients: HashMap<String, f64>,
    weight_by_trajectory: bool,
    weights: Vec<(String, Array2<f64>)>,
}

impl TrajectoryScale {
    pub fn new(geom: &Geometry, config: &Config) -> Result<Self> {
        let mut coefficients = HashMap::new();
        if config.has("coefficients") {
            for (name, value) in config.get_f64_map("coefficients")? {
                coefficients.insert(name, value);
            }
        }
        let weight_by_trajectory = if config.has("weight by trajectory") {
            config.get_bool("weight by trajectory")?
        } else {
            false
        };
        Ok(TrajectoryScale {
            geom: geom.clone(),
            coefficients,
            weight_by_trajectory,
            weights: Vec::new(),
        })
    }
}

impl VariableChange for TrajectoryScale {
    fn set_trajectory(&mut self, trajectory: &State, vars: &VariableSet) -> Result<()> {
        assert_eq!(
            trajectory.geometry(),
            &self.geom,
            "trajectory must live on the processing geometry"
        );
        self.weights.clear();
        if !self.weight_by_trajectory {
            return Ok(());
        }
        for name in vars.iter() {
            let field = trajectory.field(name).ok_or_else(|| {
                Error::Precondition(format!("trajectory state lacks variable `{}`", name))
            })?;
            let scale = field.iter().fold(0.0f64, |m, x| m.max(x.abs()));
            let weight = if scale > 0.0 {
                field.mapv(|x| x / scale)
            } else {
                Array2::from_elem(field.dim(), 1.0)
            };
            self.weights.push((name.to_string(), weight));
        }
        Ok(())
    }

    fn multiply(&self, incr: &mut Increment, vars: &VariableSet) -> Result<()> {
        let mut fs = incr.to_fieldset();
        for field in fs.iter_mut() {
            if !vars.has(field.name()) {
                continue;
            }
            let coeff = self.coefficients.get(field.name()).copied().unwrap_or(1.0);
            field.values_mut().mapv_inplace(|x| x * coeff);
            if let Some((_, weight)) = self.weights.iter().find(|(n, _)| n == field.name()) {
                *field.values_mut() *= weight;
            }
        }
        incr.merge_fieldset(&fs);
        Ok(())
    }
}

/// Applies the configured variable change to an increment, linearized about
/// `trajectory` and restricted to `vars`. The engine is constructed on the
/// processing geometry.
pub fn apply_linear_change(
    incr: &mut Increment,
    config: &Config,
    geom: &Geometry,
    trajectory: &State,
    vars: &VariableSet,
) -> Result<()> {
    info!("==========================================");
    info!("======      applying specified change of variables");

    let name = config.get_str("variable change")?;
    match name.as_str() {
        "scale" => {
            let mut engine = TrajectoryScale::new(geom, config)?;
            engine.set_trajectory(trajectory, vars)?;
            engine.multiply(incr, vars)?;
        }
        other => {
            return Err(Error::config(
                "variable change",
                format!("unknown variable change `{}`", other),
            ))
        }
    }
    debug!("increment after the variable change:\n{}", incr);
    Ok(())
}

#[cfg(test)]
mod test {
    use {
        super::*,
        approx::assert_abs_diff_eq,
        chrono::{DateTime, Utc},
    };

    fn date() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    fn increment(geom: &Geometry, vars: &[&str], value: f64) -> Increment {
        let vars = VariableSet::new(vars.to_vec());
        let mut incr = Increment::zeros(geom, &vars, date());
        for name in vars.iter() {
            incr.set_field(name, Array2::from_elem(geom.field_shape(), value));
        }
        incr
    }

    #[test]
    fn scales_by_the_configured_coefficients() {
        let geom = Geometry::new(4, 3, 2);
        let mut incr = increment(&geom, &["temp", "salt"], 2.0);
        let traj = State::new(increment(&geom, &["temp", "salt"], 10.0));
        let config = Config::from_yaml("{variable change: scale, coefficients: {temp: 0.5}}")
            .unwrap();

        let vars = incr.variables().clone();
        apply_linear_change(&mut incr, &config, &geom, &traj, &vars).unwrap();

        assert_abs_diff_eq!(incr.field("temp").unwrap()[[0, 0]], 1.0);
        // no coefficient configured: unchanged
        assert_abs_diff_eq!(incr.field("salt").unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn restricted_to_the_requested_variables() {
        let geom = Geometry::new(4, 3, 2);
        let mut incr = increment(&geom, &["temp", "salt"], 2.0);
        let traj = State::new(increment(&geom, &["temp", "salt"], 10.0));
        let config = Config::from_yaml(
            "{variable change: scale, coefficients: {temp: 0.5, salt: 0.5}}",
        )
        .unwrap();

        let only_temp = VariableSet::new(vec!["temp"]);
        apply_linear_change(&mut incr, &config, &geom, &traj, &only_temp).unwrap();

        assert_abs_diff_eq!(incr.field("temp").unwrap()[[0, 0]], 1.0);
        assert_abs_diff_eq!(incr.field("salt").unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn trajectory_weighting_normalizes_by_the_largest_magnitude() {
        let geom = Geometry::new(2, 1, 1);
        let vars = VariableSet::new(vec!["temp"]);
        let mut incr = Increment::zeros(&geom, &vars, date());
        incr.set_field("temp", Array2::from_elem(geom.field_shape(), 4.0));

        let mut traj = Increment::zeros(&geom, &vars, date());
        let mut data = Array2::zeros(geom.field_shape());
        data[[0, 0]] = 1.0;
        data[[1, 0]] = 2.0;
        traj.set_field("temp", data);

        let config =
            Config::from_yaml("{variable change: scale, weight by trajectory: true}").unwrap();
        apply_linear_change(&mut incr, &config, &geom, &State::new(traj), &vars).unwrap();

        let out = incr.field("temp").unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 2.0); // 4.0 * (1.0 / 2.0)
        assert_abs_diff_eq!(out[[1, 0]], 4.0); // 4.0 * (2.0 / 2.0)
    }

    #[test]
    fn unknown_engine_is_a_config_error() {
        let geom = Geometry::new(2, 1, 1);
        let vars = VariableSet::new(vec!["temp"]);
        let mut incr = Increment::zeros(&geom, &vars, date());
        let traj = State::new(Increment::zeros(&geom, &vars, date()));
        let config = Config::from_yaml("variable change: bogus").unwrap();
        assert!(apply_linear_change(&mut incr, &config, &geom, &traj, &vars).is_err());
    }
}
