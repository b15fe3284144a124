use {
    crate::{
        comm::Comm,
        compose, finalize,
        config::Config,
        error::{Error, Result},
        geometry::Geometry,
        increment::{Increment, State},
        lvc, resolver,
        storage::Backend,
        variables::VariableSet,
    },
    chrono::{DateTime, Utc},
    log::{debug, info},
};

/// Owned settings of one post-processing run, read from the configuration
/// once and reused for every ensemble member.
pub struct PostProc {
    pub date: DateTime<Utc>,
    pub layer_var: VariableSet,
    pub incr_vars: VariableSet,
    pub zero_vars: VariableSet,
    pub set_to_zero: bool,
    pub input_config: Config,
    pub output_config: Config,
    pub ens_size: usize,
    pub pattern: String,
    pub geom: Geometry,
    pub geom_proc: Geometry,
    /// Layer thicknesses on the processing geometry, read once and reused
    /// as the padding template for appended variables.
    pub layers: Increment,
}

impl PostProc {
    pub fn new(
        config: &Config,
        geom: &Geometry,
        geom_proc: &Geometry,
        backend: &dyn Backend,
    ) -> Result<Self> {
        let date = config.get_date("date")?;
        info!("date: {}", date);

        let incr_vars = VariableSet::from_config(config, "increment variables")?;
        if incr_vars.is_empty() {
            return Err(Error::config(
                "increment variables",
                "at least one variable is required",
            ));
        }

        let layer_var = VariableSet::from_config(config, "layers variable")?;
        if layer_var.len() != 1 {
            return Err(Error::config(
                "layers variable",
                "exactly one layer variable is required",
            ));
        }

        // templated ensemble mode, or a single explicit increment
        let (input_config, ens_size, pattern) = if config.has("soca increments.template") {
            (
                config.sub("soca increments.template")?,
                config.get_usize("soca increments.number of increments")?,
                config.get_str("soca increments.pattern")?,
            )
        } else {
            (config.sub("soca increment")?, 1, String::new())
        };
        if ens_size < 1 {
            return Err(Error::config(
                "soca increments.number of increments",
                "the ensemble must hold at least one member",
            ));
        }

        let output_config = config.sub("output increment")?;

        let (zero_vars, set_to_zero) = if config.has("set increment variables to zero") {
            (
                VariableSet::from_config(config, "set increment variables to zero")?,
                true,
            )
        } else {
            (VariableSet::default(), false)
        };

        let layers = Self::layer_thickness(config, geom, geom_proc, &layer_var, date, backend)?;

        Ok(PostProc {
            date,
            layer_var,
            incr_vars,
            zero_vars,
            set_to_zero,
            input_config,
            output_config,
            ens_size,
            pattern,
            geom: geom.clone(),
            geom_proc: geom_proc.clone(),
            layers,
        })
    }

    /// Layer thicknesses from the vertical-geometry background, read on the
    /// native geometry and carried over to the processing one.
    fn layer_thickness(
        config: &Config,
        geom: &Geometry,
        geom_proc: &Geometry,
        layer_var: &VariableSet,
        date: DateTime<Utc>,
        backend: &dyn Backend,
    ) -> Result<Increment> {
        let mut layers = Increment::zeros(geom, layer_var, date);
        backend.read(&mut layers, &config.sub("vertical geometry")?)?;
        let layers = layers.change_resolution(geom_proc);
        debug!("layer thickness:\n{}", layers);
        Ok(layers)
    }

    /// Reads ensemble member `member` and regrids it onto the processing
    /// geometry.
    pub fn read(&self, member: usize, backend: &dyn Backend) -> Result<Increment> {
        info!("==========================================");
        info!("======  reading ensemble member {}", member);

        let mut incr = Increment::zeros(&self.geom, &self.incr_vars, self.date);
        let member_config = resolver::resolve(&self.input_config, &self.pattern, member);
        backend.read(&mut incr, &member_config)?;
        debug!("input increment:\n{}", incr);

        Ok(incr.change_resolution(&self.geom_proc))
    }
}

/// Runs the whole post-processing pipeline on one worker of the SPMD group.
///
/// Every worker executes the identical member loop; the save step
/// synchronizes the group and the returned status is meaningful on the
/// coordinator rank. Note the status is overwritten each iteration, so only
/// the last member's save status reaches the caller.
pub fn run(config: &Config, comm: &dyn Comm, backend: &dyn Backend) -> Result<i32> {
    let geom_config = config.sub("geometry")?;
    info!("geometry:\n{}", geom_config);
    let geom = Geometry::from_config(&geom_config)?;
    let geom_proc = if config.has("processing geometry") {
        Geometry::from_config(&config.sub("processing geometry")?)?
    } else {
        geom.clone()
    };

    if comm.size() < 2 {
        return Err(Error::Precondition(
            "this application requires at least 2 workers".to_string(),
        ));
    }

    let pp = PostProc::new(config, &geom, &geom_proc, backend)?;
    info!("soca increments:\n{}", pp.input_config);

    // optional trajectory-linked variable change
    let lvc_setup = if config.has("linear variable change") && config.has("trajectory") {
        let mut traj = Increment::zeros(&geom, &pp.incr_vars, pp.date);
        backend.read(&mut traj, &config.sub("trajectory")?)?;
        Some((
            config.sub("linear variable change")?,
            State::new(traj.change_resolution(&geom_proc)),
        ))
    } else {
        None
    };

    let mut result = 0;
    for member in 1..=pp.ens_size {
        let incr = pp.read(member, backend)?;

        // graft the zeroed and layer variables onto the increment
        let mut extra = pp.zero_vars.clone();
        extra += &pp.layer_var;
        let mut incr = compose::append_variables(&incr, &extra, &pp.layers);

        compose::zero_fields(&mut incr, &pp.zero_vars, pp.set_to_zero);

        if let Some((ref lvc_config, ref trajectory)) = lvc_setup {
            lvc::apply_linear_change(&mut incr, lvc_config, &geom_proc, trajectory, &pp.incr_vars)?;
        }

        result = finalize::save(
            &incr,
            member,
            finalize::DEFAULT_DOMAINS,
            &pp.output_config,
            comm,
            backend,
        )?;
    }
    Ok(result)
}
