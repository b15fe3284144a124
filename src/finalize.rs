use {
    crate::{
        comm::Comm,
        config::Config,
        error::Result,
        increment::Increment,
        resolver::swap_pattern,
        storage::Backend,
    },
    log::{info, warn},
    std::fs,
};

/// Physical domains finalized by default.
pub const DEFAULT_DOMAINS: &[&str] = &["ocn", "ice"];

/// Writes the processed increment and renames the backend's fixed-name
/// output files to their final names.
///
/// All ranks write, then meet at a barrier; only the coordinator renames, so
/// no final name ever points at a file a worker is still writing. The
/// returned status is the sum of the per-domain OS rename codes (0 on
/// success). The sum cannot tell which domain failed, or mask-proof
/// overlapping codes; it is kept for compatibility with the downstream
/// workflow, which only tests for zero. Consult the log for per-domain
/// failures.
pub fn save(
    incr: &Increment,
    member: usize,
    domains: &[&str],
    output: &Config,
    comm: &dyn Comm,
    backend: &dyn Backend,
) -> Result<i32> {
    info!("==========================================");
    info!("-------------------- save increment:");
    info!("{}", incr);
    backend.write(incr, output, comm)?;

    // wait for everybody to be done
    comm.barrier();

    if comm.rank() != 0 {
        return Ok(0);
    }

    let datadir = output.get_str("datadir")?;
    let output_file = output.get_str("output file")?;

    let mut result = 0;
    for domain in domains {
        let mut final_name = format!("{}/{}.{}", datadir, domain, output_file);
        if output.has("pattern") {
            let pattern = output.get_str("pattern")?;
            final_name = swap_pattern(&final_name, &pattern, &member.to_string());
        }

        let fixed_name = backend.output_path(domain, output, incr.date())?;
        info!(
            "domain: {} rename: {} to {}",
            domain,
            fixed_name.display(),
            final_name
        );
        result += match fs::rename(&fixed_name, &final_name) {
            Ok(()) => 0,
            Err(e) => {
                warn!("rename failed for domain {}: {}", domain, e);
                e.raw_os_error().unwrap_or(-1)
            }
        };
    }
    Ok(result)
}
