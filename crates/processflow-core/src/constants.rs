pub mod dirs {
    pub const OUTPUT: &str = "output";
    pub const PP: &str = "pp";
    pub const CLIMO: &str = "climo";
    pub const TS: &str = "ts";
    pub const REGRID: &str = "regrid";
    pub const DIAGS: &str = "diags";
    pub const SCRIPTS: &str = "scripts";
    pub const TMP: &str = "tmp";
    pub const INPUT: &str = "input";
}

/// Tags under which completed jobs register their outputs.
pub mod data_types {
    pub const CLIMO_NATIVE: &str = "climo_native";
    pub const CLIMO_REGRID: &str = "climo_regrid";
    pub const TS_NATIVE_PREFIX: &str = "ts_native_";
    pub const TS_REGRID_PREFIX: &str = "ts_regrid_";
    pub const REGRID_PREFIX: &str = "regrid_";
}

pub mod thresholds {
    /// Twelve monthly means, four seasonal means and the annual mean.
    pub const CLIMO_MIN_FILES: usize = 17;
    pub const APRIME_MIN_FILES: usize = 600;
    pub const MONTHS_PER_YEAR: u32 = 12;
}

pub mod placeholders {
    pub const CASEID: &str = "CASEID";
    pub const YEAR: &str = "YEAR";
    pub const MONTH: &str = "MONTH";
    pub const PROJECT_PATH: &str = "PROJECT_PATH";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_tags() {
        assert_eq!(data_types::CLIMO_REGRID, "climo_regrid");
        assert_eq!(
            format!("{}{}", data_types::TS_NATIVE_PREFIX, "atm"),
            "ts_native_atm"
        );
    }

    #[test]
    fn test_climo_threshold() {
        assert_eq!(thresholds::CLIMO_MIN_FILES, 17);
    }
}
