//! Shared test fixture: synthesizes a small parameter sweep on disk
//! (trial directories with input files, a simulator log, and forward
//! tables) plus the matching help text and sweep config.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sweep_db::config::SweepConfig;
use sweep_db::help::HelpDict;

/// Captured simulator self-documentation used by every fixture sweep.
pub const HELP_TEXT: &str = "\
 **sName
   Type             | String
 **sSystemName
   Type             | String
 **saBodyFiles
   Type             | String-Array
 **saOutputOrder
   Type             | String-Array
 **dMass
   Type             | Double
   Dimension(s)     | mass
   Custom unit      | Mearth
   Default value    | 1.0
 **dSemi
   Type             | Double
   Dimension(s)     | length
   Custom unit      | AU
   Default value    | 1.0
 **dTMan
   Type             | Double
   Dimension(s)     | temperature
   Default value    | 3000.0
 **sUnitMass
   Type             | String
   Default value    | kg
 **sUnitLength
   Type             | String
   Default value    | m
 **sUnitTime
   Type             | String
   Default value    | sec
 **sUnitAngle
   Type             | String
   Default value    | rad
 **sUnitTemp
   Type             | String
   Default value    | K
Output Parameters
";

/// A sweep on disk plus its config file.
pub struct Fixture {
    /// Owns the temp directory for the fixture's lifetime
    pub dir: tempfile::TempDir,
    /// Path of the written sweep config
    pub config_path: PathBuf,
}

impl Fixture {
    /// Build a sweep with one trial per entry of `bases`; trial `i`'s mantle
    /// temperature series is `[base, base - 50, base - 100]`.
    #[must_use]
    pub fn new(bases: &[f64]) -> Self {
        Self::with_config_extra(bases, "")
    }

    /// Like [`Fixture::new`] with extra config directives appended.
    #[must_use]
    pub fn with_config_extra(bases: &[f64], extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let sweep_dir = dir.path().join("sweep_out");
        fs::create_dir(&sweep_dir).expect("mkdir sweep_out");

        for (i, base) in bases.iter().enumerate() {
            write_trial(&sweep_dir.join(format!("trial_{i:02}")), *base);
        }

        let config_path = dir.path().join("sweep.in");
        fs::write(
            &config_path,
            format!(
                "sDestFolder sweep_out\nsPrimaryFile vpl.in\nsaBodyFiles [sun.in earth.in]\n{extra}"
            ),
        )
        .expect("write config");

        Self { dir, config_path }
    }

    /// Parse the fixture's config.
    pub fn config(&self) -> SweepConfig {
        SweepConfig::from_file(&self.config_path).expect("valid fixture config")
    }

    /// The fixture help dictionary.
    pub fn help(&self) -> HelpDict {
        HelpDict::parse(HELP_TEXT)
    }

    /// Archive container path the config resolves to.
    pub fn archive_path(&self) -> PathBuf {
        self.config().archive_file
    }

    /// Checkpoint path the config resolves to.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.config().checkpoint_path()
    }
}

/// Write one trial directory: input files, log, forward table.
pub fn write_trial(trial: &Path, base: f64) {
    fs::create_dir_all(trial).expect("mkdir trial");

    fs::write(
        trial.join("vpl.in"),
        "# primary input\n\
         sSystemName solar\n\
         sPrimaryFile vpl.in\n\
         saBodyFiles sun.in earth.in\n\
         sUnitMass kg\n\
         sUnitLength m\n\
         sUnitTime sec\n\
         sUnitAngle rad\n\
         bDoForward 1\n",
    )
    .expect("write vpl.in");

    fs::write(
        trial.join("sun.in"),
        "sName sun\ndMass 1.989e30\n",
    )
    .expect("write sun.in");

    fs::write(
        trial.join("earth.in"),
        format!(
            "sName earth\n\
             dMass -1.0\n\
             dSemi 1.0\n\
             dTMan {base}\n\
             saOutputOrder -Time -TMan\n"
        ),
    )
    .expect("write earth.in");

    fs::write(trial.join("solar.log"), log_text(base)).expect("write log");

    fs::write(
        trial.join("solar.earth.forward"),
        format!(
            "0.0 {:.6e}\n1.0 {:.6e}\n2.0 {:.6e}\n",
            base,
            base - 50.0,
            base - 100.0
        ),
    )
    .expect("write forward");
}

fn log_text(base: f64) -> String {
    format!(
        "-------- Log file solar.log -------\n\
         \n\
         Executable: /usr/local/bin/simulator\n\
         System Name: solar\n\
         \n\
         ---- INITIAL SYSTEM PROPERTIES ----\n\
         (Age) System Age [sec]: 0.000000\n\
         \n\
         ----- BODY: sun ----\n\
         (Mass) Mass [kg]: 1.988416e+30\n\
         \n\
         ----- BODY: earth ----\n\
         (Mass) Mass [kg]: 5.972000e+24\n\
         (TMan) Upper Mantle Temperature [K]: {base:.6}\n\
         (Eccentricity) Orbital Eccentricity []: 0.0167\n\
         Output Order: Time [sec] TMan [K]\n\
         \n\
         ---- FINAL SYSTEM PROPERTIES ----\n\
         (Age) System Age [sec]: 1.577880e+17\n\
         \n\
         ----- BODY: sun ----\n\
         (Mass) Mass [kg]: 1.988416e+30\n\
         \n\
         ----- BODY: earth ----\n\
         (TMan) Upper Mantle Temperature [K]: {final_tman:.6}\n\
         Output Order: Time [sec] TMan [K]\n",
        base = base,
        final_tman = base - 100.0
    )
}
