use {
    crate::{
        comm::Comm,
        config::Config,
        error::{Error, Result},
        increment::Increment,
    },
    byteorder::{ByteOrder, LittleEndian},
    chrono::{DateTime, Utc},
    log::info,
    ndarray::Array2,
    serde::{Deserialize, Serialize},
    std::{
        fs::File,
        io::{BufReader, BufWriter, Write},
        path::{Path, PathBuf},
    },
};

/// Narrow contract to the increment storage backend.
///
/// `write` is collective: every rank calls it for the same increment and it
/// returns once the output is durably on disk. `output_path` is the backend's
/// fixed-name convention for the file `write` leaves behind per domain.
pub trait Backend: Send + Sync {
    fn read(&self, incr: &mut Increment, config: &Config) -> Result<()>;
    fn write(&self, incr: &Increment, config: &Config, comm: &dyn Comm) -> Result<()>;
    fn output_path(&self, domain: &str, config: &Config, date: DateTime<Utc>) -> Result<PathBuf>;
}

/// Variables routed to the ice output file unless the output configuration
/// overrides the list with an `ice variables` key.
const ICE_VARIABLES: &[&str] = &["cicen", "hicen", "hsnon"];

/// On-disk payload of a native-format increment file.
#[derive(Debug, Serialize, Deserialize)]
struct NativeFile {
    date: DateTime<Utc>,
    variables: Vec<String>,
    nx: usize,
    ny: usize,
    levels: usize,
    fields: Vec<Array2<f64>>,
}

/// File-based storage backend.
///
/// Input increments are bincode-encoded [`NativeFile`]s. Output increments
/// are one raw little-endian `f64` stream per physical domain (an 8-byte
/// zero header, then each of the domain's fields in declaration order),
/// written to the fixed-name path `{datadir}/{domain}.{exp}.{type}.{date}.r8`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl FileBackend {
    /// Serializes an increment in the native input format. This is the
    /// format the assimilation solver hands over; tests use it to stage
    /// pipeline inputs.
    pub fn write_native<P: AsRef<Path>>(incr: &Increment, path: P) -> Result<()> {
        let path = path.as_ref();
        let geom = incr.geometry();
        let file = NativeFile {
            date: incr.date(),
            variables: incr.variables().iter().map(String::from).collect(),
            nx: geom.nx(),
            ny: geom.ny(),
            levels: geom.levels(),
            fields: incr.fields().iter().map(|f| f.values().clone()).collect(),
        };
        let out = File::create(path).map_err(|e| Error::io(path, e))?;
        bincode::serialize_into(BufWriter::new(out), &file).map_err(|e| Error::Format {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    fn read_native(path: &Path) -> Result<NativeFile> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| Error::Format {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    fn ice_variables(config: &Config) -> Result<Vec<String>> {
        if config.has("ice variables") {
            config.get_str_list("ice variables")
        } else {
            Ok(ICE_VARIABLES.iter().map(|s| s.to_string()).collect())
        }
    }
}

impl Backend for FileBackend {
    fn read(&self, incr: &mut Increment, config: &Config) -> Result<()> {
        let path = PathBuf::from(config.get_str("input file")?);
        let file = Self::read_native(&path)?;

        let geom = incr.geometry().clone();
        if (file.nx, file.ny, file.levels) != (geom.nx(), geom.ny(), geom.levels()) {
            return Err(Error::Format {
                path,
                reason: format!(
                    "grid {}x{}x{} does not match the expected {}x{}x{}",
                    file.nx,
                    file.ny,
                    file.levels,
                    geom.nx(),
                    geom.ny(),
                    geom.levels()
                ),
            });
        }
        if file.date != incr.date() {
            return Err(Error::Format {
                path,
                reason: format!(
                    "file valid at {} but {} was requested",
                    file.date.format("%Y-%m-%dT%H:%M:%SZ"),
                    incr.date().format("%Y-%m-%dT%H:%M:%SZ")
                ),
            });
        }

        let wanted: Vec<String> = incr.variables().iter().map(String::from).collect();
        for name in &wanted {
            let idx = file
                .variables
                .iter()
                .position(|v| v == name)
                .ok_or_else(|| Error::Format {
                    path: path.clone(),
                    reason: format!("variable `{}` is not present in the file", name),
                })?;
            incr.set_field(name, file.fields[idx].clone());
        }
        Ok(())
    }

    fn write(&self, incr: &Increment, config: &Config, comm: &dyn Comm) -> Result<()> {
        // Collective write, gathered to the coordinator. Every rank holds
        // the full grid here, so only rank 0 touches the filesystem.
        if comm.rank() != 0 {
            return Ok(());
        }

        let ice = Self::ice_variables(config)?;
        for domain in &["ocn", "ice"] {
            let path = self.output_path(domain, config, incr.date())?;
            let file = File::create(&path).map_err(|e| Error::io(path.clone(), e))?;
            let mut w = BufWriter::new(file);
            w.write_all(&[0u8; 8])
                .map_err(|e| Error::io(path.clone(), e))?;

            let mut buf = [0u8; 8];
            for field in incr.fields() {
                let is_ice = ice.iter().any(|v| v == field.name());
                if (*domain == "ice") != is_ice {
                    continue;
                }
                for x in field.values().iter() {
                    LittleEndian::write_f64(&mut buf, *x);
                    w.write_all(&buf).map_err(|e| Error::io(path.clone(), e))?;
                }
            }
            w.flush().map_err(|e| Error::io(path.clone(), e))?;
            info!("wrote {} increment to {}", domain, path.display());
        }
        Ok(())
    }

    fn output_path(&self, domain: &str, config: &Config, date: DateTime<Utc>) -> Result<PathBuf> {
        let datadir = PathBuf::from(config.get_str("datadir")?);
        let datadir = datadir
            .canonicalize()
            .map_err(|e| Error::io(datadir.clone(), e))?;
        Ok(datadir.join(format!(
            "{}.{}.{}.{}.r8",
            domain,
            config.get_str("exp")?,
            config.get_str("type")?,
            date.format("%Y-%m-%dT%H:%M:%SZ")
        )))
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{comm::ThreadComm, geometry::Geometry, variables::VariableSet},
        ndarray::Array2,
        tempdir::TempDir,
    };

    fn date() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    fn sample_increment(geom: &Geometry) -> Increment {
        let vars = VariableSet::new(vec!["temp", "salt", "cicen"]);
        let mut incr = Increment::zeros(geom, &vars, date());
        incr.set_field("temp", Array2::from_elem(geom.field_shape(), 1.0));
        incr.set_field("salt", Array2::from_elem(geom.field_shape(), 2.0));
        incr.set_field("cicen", Array2::from_elem(geom.field_shape(), 3.0));
        incr
    }

    #[test]
    fn read_copies_the_requested_variables() {
        let dir = TempDir::new("incr-postproc").unwrap();
        let geom = Geometry::new(4, 3, 2);
        let path = dir.path().join("incr.bin");
        FileBackend::write_native(&sample_increment(&geom), &path).unwrap();

        // only a subset of the file's variables is requested
        let vars = VariableSet::new(vec!["salt"]);
        let mut incr = Increment::zeros(&geom, &vars, date());
        let config =
            Config::from_yaml(&format!("input file: {}", path.display())).unwrap();
        FileBackend.read(&mut incr, &config).unwrap();
        assert_eq!(incr.field("salt").unwrap()[[0, 0]], 2.0);
        assert!(incr.field("temp").is_none());
    }

    #[test]
    fn read_rejects_a_missing_variable() {
        let dir = TempDir::new("incr-postproc").unwrap();
        let geom = Geometry::new(4, 3, 2);
        let path = dir.path().join("incr.bin");
        FileBackend::write_native(&sample_increment(&geom), &path).unwrap();

        let vars = VariableSet::new(vec!["uocn"]);
        let mut incr = Increment::zeros(&geom, &vars, date());
        let config =
            Config::from_yaml(&format!("input file: {}", path.display())).unwrap();
        match FileBackend.read(&mut incr, &config) {
            Err(Error::Format { reason, .. }) => assert!(reason.contains("uocn")),
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn read_rejects_a_mismatched_grid() {
        let dir = TempDir::new("incr-postproc").unwrap();
        let path = dir.path().join("incr.bin");
        FileBackend::write_native(&sample_increment(&Geometry::new(4, 3, 2)), &path).unwrap();

        let other = Geometry::new(5, 3, 2);
        let vars = VariableSet::new(vec!["temp"]);
        let mut incr = Increment::zeros(&other, &vars, date());
        let config =
            Config::from_yaml(&format!("input file: {}", path.display())).unwrap();
        assert!(FileBackend.read(&mut incr, &config).is_err());
    }

    #[test]
    fn write_splits_domains_and_orders_fields() {
        let dir = TempDir::new("incr-postproc").unwrap();
        let geom = Geometry::new(4, 3, 2);
        let incr = sample_increment(&geom);
        let config = Config::from_yaml(&format!(
            "{{datadir: {}, exp: test, type: incr}}",
            dir.path().display()
        ))
        .unwrap();

        let comm = ThreadComm::split(1).pop().unwrap();
        FileBackend.write(&incr, &config, &comm).unwrap();

        let n = geom.npoints() * geom.levels();
        let ocn = std::fs::read(FileBackend.output_path("ocn", &config, date()).unwrap()).unwrap();
        let values: Vec<f64> = ocn.chunks(8).skip(1).map(LittleEndian::read_f64).collect();
        assert_eq!(values.len(), 2 * n);
        assert!(values[..n].iter().all(|x| *x == 1.0)); // temp
        assert!(values[n..].iter().all(|x| *x == 2.0)); // salt

        let ice = std::fs::read(FileBackend.output_path("ice", &config, date()).unwrap()).unwrap();
        let values: Vec<f64> = ice.chunks(8).skip(1).map(LittleEndian::read_f64).collect();
        assert_eq!(values.len(), n);
        assert!(values.iter().all(|x| *x == 3.0)); // cicen
    }

    #[test]
    fn fixed_output_name_embeds_the_date() {
        let dir = TempDir::new("incr-postproc").unwrap();
        let config = Config::from_yaml(&format!(
            "{{datadir: {}, exp: exp01, type: incr}}",
            dir.path().display()
        ))
        .unwrap();
        let path = FileBackend.output_path("ocn", &config, date()).unwrap();
        assert!(path
            .to_string_lossy()
            .ends_with("ocn.exp01.incr.2024-01-01T00:00:00Z.r8"));
    }
}
