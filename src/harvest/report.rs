//! Run statistics

use serde::Serialize;

/// What one harvest run did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarvestReport {
    /// The checkpoint was empty at start
    pub first_run: bool,
    /// Identifiers taken from the remote table on a first run
    pub seeded_from_remote: usize,
    /// Listing pages scanned
    pub listing_pages: usize,
    /// Distinct identifiers found on listing pages
    pub discovered: usize,
    /// New identifiers selected for this run
    pub pending: usize,
    /// New identifiers left for a later run by the per-run cap
    pub deferred: usize,
    /// Documents resolved with content
    pub resolved: usize,
    /// Documents skipped after a resolution failure
    pub skipped: usize,
    /// Batches published
    pub batches_published: usize,
    /// Records written to the remote table
    pub records_published: usize,
    /// Records not written because their URL already existed remotely
    pub already_present: usize,
    /// Checkpoint saves that failed after a successful publish
    pub checkpoint_save_failures: usize,
    /// Identifiers in the checkpoint at the end of the run
    pub checkpoint_size: usize,
    /// Wall-clock duration
    pub elapsed_seconds: f64,
}

impl HarvestReport {
    /// Documents resolved per second
    pub fn docs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.resolved as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Nothing new was found
    pub fn is_noop(&self) -> bool {
        self.pending == 0
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\nHarvest Summary");
        println!("===============");
        println!("First run:            {}", if self.first_run { "yes" } else { "no" });
        if self.seeded_from_remote > 0 {
            println!("Seeded from remote:   {}", self.seeded_from_remote);
        }
        println!("Listing pages:        {}", self.listing_pages);
        println!("Identifiers found:    {}", self.discovered);
        println!("New this run:         {}", self.pending);
        if self.deferred > 0 {
            println!("Deferred (cap):       {}", self.deferred);
        }
        println!("Documents resolved:   {}", self.resolved);
        println!("Documents skipped:    {}", self.skipped);
        println!("Batches published:    {}", self.batches_published);
        println!("Records published:    {}", self.records_published);
        println!("Already present:      {}", self.already_present);
        if self.checkpoint_save_failures > 0 {
            println!("Checkpoint failures:  {}", self.checkpoint_save_failures);
        }
        println!("Checkpoint size:      {}", self.checkpoint_size);
        println!("Elapsed time:         {:.1}s", self.elapsed_seconds);
        println!("Resolution rate:      {:.2} docs/s", self.docs_per_second());
    }
}
