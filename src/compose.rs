use {
    crate::{increment::Increment, variables::VariableSet},
    log::{debug, info},
};

/// Appends variables to an increment, padding them with the template's
/// values.
///
/// Both the copy of `base` and a copy of `layer_template` are widened to the
/// union of the variable sets with zero-filled slots, then summed. Fields
/// only in `to_append` therefore take the template's values, fields only in
/// `base` are unchanged, and a variable carried by both operands ends up as
/// their sum.
pub fn append_variables(
    base: &Increment,
    to_append: &VariableSet,
    layer_template: &Increment,
) -> Increment {
    info!("==========================================");
    info!("======  append {}", to_append);

    let mut output_vars = base.variables().clone();
    output_vars += to_append;
    debug!("output variables: {}", output_vars);

    // zero-fill the appended slots on a copy of the base
    let mut out = base.clone();
    out.update_fields(&output_vars);

    // the template supplies the appended values, zero everywhere else
    let mut padded = layer_template.clone();
    padded.update_fields(&output_vars);

    out += &padded;
    debug!("output increment:\n{}", out);
    out
}

/// Appends the layer thickness variable, valued from the pre-loaded
/// thickness increment.
pub fn append_layer(
    incr: &Increment,
    layer_var: &VariableSet,
    layers: &Increment,
) -> Increment {
    append_variables(incr, layer_var, layers)
}

/// Overwrites every field named in `zero_set` with 0.0, in place. Fields
/// outside the set are untouched; a disabled call leaves the increment
/// completely unchanged.
pub fn zero_fields(incr: &mut Increment, zero_set: &VariableSet, enabled: bool) {
    info!("==========================================");
    if !enabled {
        info!("======      no variables to set to 0.0");
        return;
    }
    info!("======      set specified increment variables to 0.0");

    let mut fs = incr.to_fieldset();
    for field in fs.iter_mut() {
        if zero_set.has(field.name()) {
            info!("setting {} to 0", field.name());
            field.values_mut().fill(0.0);
        }
    }
    incr.merge_fieldset(&fs);
    debug!("increment with zeroed fields:\n{}", incr);
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::geometry::Geometry,
        approx::assert_abs_diff_eq,
        chrono::{DateTime, Utc},
        ndarray::Array2,
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
    fn append_takes_values_from_the_template() {
        let geom = Geometry::new(4, 3, 2);
        let base = increment(&geom, &["temp", "salt"], 1.0);
        let layers = increment(&geom, &["hocn"], 7.5);
        let to_append = VariableSet::new(vec!["hocn"]);

        let out = append_variables(&base, &to_append, &layers);

        let mut expected_vars = base.variables().clone();
        expected_vars += &to_append;
        assert_eq!(out.variables(), &expected_vars);
        assert_abs_diff_eq!(out.field("temp").unwrap()[[0, 0]], 1.0);
        assert_abs_diff_eq!(out.field("salt").unwrap()[[11, 1]], 1.0);
        assert_abs_diff_eq!(out.field("hocn").unwrap()[[5, 0]], 7.5);
    }

    #[test]
    fn append_leaves_the_base_untouched() {
        let geom = Geometry::new(4, 3, 2);
        let base = increment(&geom, &["temp"], 2.0);
        let layers = increment(&geom, &["hocn"], 7.5);

        let _ = append_variables(&base, &VariableSet::new(vec!["hocn"]), &layers);
        assert_eq!(base.variables().len(), 1);
        assert_abs_diff_eq!(base.field("temp").unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn append_pads_variables_missing_from_the_template_with_zero() {
        // appending a zero-set variable the template does not carry
        let geom = Geometry::new(4, 3, 2);
        let base = increment(&geom, &["temp"], 1.0);
        let layers = increment(&geom, &["hocn"], 7.5);
        let to_append = VariableSet::new(vec!["salt", "hocn"]);

        let out = append_variables(&base, &to_append, &layers);
        assert_abs_diff_eq!(out.field("salt").unwrap()[[3, 1]], 0.0);
        assert_abs_diff_eq!(out.field("hocn").unwrap()[[3, 1]], 7.5);
    }

    #[test]
    fn append_layer_grafts_the_thickness_values() {
        let geom = Geometry::new(4, 3, 2);
        let base = increment(&geom, &["temp"], 1.0);
        let layer_var = VariableSet::new(vec!["hocn"]);
        let layers = increment(&geom, &["hocn"], 7.5);

        let out = append_layer(&base, &layer_var, &layers);
        assert!(out.variables().has("hocn"));
        assert_abs_diff_eq!(out.field("hocn").unwrap()[[0, 0]], 7.5);
    }

    #[test]
    fn zeroing_is_selective() {
        let geom = Geometry::new(4, 3, 2);
        let mut incr = increment(&geom, &["temp", "salt"], 3.0);

        zero_fields(&mut incr, &VariableSet::new(vec!["temp"]), true);

        assert!(incr.field("temp").unwrap().iter().all(|x| *x == 0.0));
        assert!(incr.field("salt").unwrap().iter().all(|x| *x == 3.0));
    }

    #[test]
    fn zeroing_disabled_is_a_no_op() {
        let geom = Geometry::new(4, 3, 2);
        let mut incr = increment(&geom, &["temp"], 3.0);
        let before = incr.clone();

        zero_fields(&mut incr, &VariableSet::new(vec!["temp"]), false);
        assert_eq!(incr, before);
    }
}
