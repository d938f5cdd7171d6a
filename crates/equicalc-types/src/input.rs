//! Calculation input snapshot
//!
//! The forms own the input and fill it in section by section, so every
//! section is optional here. [`CalculationInput::validate`] turns a complete
//! snapshot into a [`ValidatedInput`], which is the only thing request
//! derivation accepts.

use crate::error::{IssueReason, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Longest projection horizon the engine accepts
pub const MAX_EXIT_YEAR: u32 = 20;

/// User-entered parameters, one snapshot per edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationInput {
    /// Horizon shared by every calculation
    #[serde(default)]
    pub global_settings: Option<GlobalSettings>,
    /// The job the user would leave
    #[serde(default)]
    pub current_job: Option<CurrentJob>,
    /// The startup offer
    #[serde(default)]
    pub equity_details: Option<EquityDetails>,
}

impl CalculationInput {
    /// Create an empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With global settings
    #[inline]
    #[must_use]
    pub fn with_global_settings(mut self, settings: GlobalSettings) -> Self {
        self.global_settings = Some(settings);
        self
    }

    /// With current job
    #[inline]
    #[must_use]
    pub fn with_current_job(mut self, job: CurrentJob) -> Self {
        self.current_job = Some(job);
        self
    }

    /// With equity details
    #[inline]
    #[must_use]
    pub fn with_equity_details(mut self, details: EquityDetails) -> Self {
        self.equity_details = Some(details);
        self
    }

    /// Validate the snapshot
    ///
    /// # Errors
    /// Returns every missing section and every violated field constraint.
    pub fn validate(&self) -> Result<ValidatedInput<'_>, ValidationError> {
        let mut v = Validator::new();

        match &self.global_settings {
            Some(settings) => settings.check(&mut v),
            None => v.push("global_settings", IssueReason::Missing),
        }
        match &self.current_job {
            Some(job) => job.check(&mut v),
            None => v.push("current_job", IssueReason::Missing),
        }
        match &self.equity_details {
            Some(details) => {
                let exit_year = self.global_settings.as_ref().map(|s| s.exit_year);
                details.check(&mut v, exit_year);
            }
            None => v.push("equity_details", IssueReason::Missing),
        }

        let (Some(global), Some(job), Some(equity)) =
            (&self.global_settings, &self.current_job, &self.equity_details)
        else {
            return Err(v.into_error());
        };
        v.finish()?;
        Ok(ValidatedInput { global, job, equity })
    }

    /// Whether [`validate`](Self::validate) would succeed
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Borrowed view of a snapshot that passed validation
#[derive(Debug, Clone, Copy)]
pub struct ValidatedInput<'a> {
    /// Global settings
    pub global: &'a GlobalSettings,
    /// Current job
    pub job: &'a CurrentJob,
    /// Startup offer
    pub equity: &'a EquityDetails,
}

/// Settings shared by all calculations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Year of the liquidity event, counted from today
    pub exit_year: u32,
}

impl GlobalSettings {
    fn check(&self, v: &mut Validator) {
        v.check(
            (1..=MAX_EXIT_YEAR).contains(&self.exit_year),
            "global_settings.exit_year",
            IssueReason::OutOfRange {
                min: 1.0,
                max: f64::from(MAX_EXIT_YEAR),
            },
        );
    }
}

/// How often surplus salary is invested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentFrequency {
    /// Invest every month
    #[default]
    Monthly,
    /// Invest once a year
    Annually,
}

/// The job the user would leave
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentJob {
    /// Gross monthly salary
    pub monthly_salary: f64,
    /// Expected yearly raise, as a fraction (0.03 = 3%)
    pub annual_salary_growth_rate: f64,
    /// Expected return on invested surplus, as a fraction
    pub assumed_annual_roi: f64,
    /// Investment cadence
    #[serde(default)]
    pub investment_frequency: InvestmentFrequency,
}

impl CurrentJob {
    fn check(&self, v: &mut Validator) {
        v.non_negative("current_job.monthly_salary", self.monthly_salary);
        v.in_range(
            "current_job.annual_salary_growth_rate",
            self.annual_salary_growth_rate,
            -1.0,
            1.0,
        );
        v.in_range(
            "current_job.assumed_annual_roi",
            self.assumed_annual_roi,
            -1.0,
            1.0,
        );
    }
}

/// Vesting schedule of the grant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// Total vesting period in years
    pub total_vesting_years: u32,
    /// Cliff in years; nothing vests before it
    pub cliff_years: u32,
}

impl VestingSchedule {
    fn check(&self, v: &mut Validator) {
        v.check(
            (1..=MAX_EXIT_YEAR).contains(&self.total_vesting_years),
            "equity_details.vesting.total_vesting_years",
            IssueReason::OutOfRange {
                min: 1.0,
                max: f64::from(MAX_EXIT_YEAR),
            },
        );
        v.check(
            self.cliff_years <= self.total_vesting_years,
            "equity_details.vesting.cliff_years",
            IssueReason::Inconsistent("must not exceed the vesting period".into()),
        );
    }
}

/// Kind of equity grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquityType {
    /// Restricted stock units
    Rsu,
    /// Stock options
    StockOptions,
}

/// Startup offer; the variants carry mutually exclusive fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "equity_type", rename_all = "snake_case")]
pub enum EquityDetails {
    /// Restricted stock units
    Rsu(RsuDetails),
    /// Stock options
    StockOptions(StockOptionDetails),
}

impl EquityDetails {
    /// Grant kind
    #[inline]
    #[must_use]
    pub fn equity_type(&self) -> EquityType {
        match self {
            Self::Rsu(_) => EquityType::Rsu,
            Self::StockOptions(_) => EquityType::StockOptions,
        }
    }

    /// Startup monthly salary
    #[inline]
    #[must_use]
    pub fn monthly_salary(&self) -> f64 {
        match self {
            Self::Rsu(rsu) => rsu.monthly_salary,
            Self::StockOptions(options) => options.monthly_salary,
        }
    }

    /// Vesting schedule
    #[inline]
    #[must_use]
    pub fn vesting(&self) -> &VestingSchedule {
        match self {
            Self::Rsu(rsu) => &rsu.vesting,
            Self::StockOptions(options) => &options.vesting,
        }
    }

    /// Dilution rounds that should be simulated, if any
    #[must_use]
    pub fn simulated_dilution_rounds(&self) -> Option<&[DilutionRound]> {
        match self {
            Self::Rsu(rsu) if rsu.simulate_dilution && !rsu.dilution_rounds.is_empty() => {
                Some(&rsu.dilution_rounds)
            }
            _ => None,
        }
    }

    fn check(&self, v: &mut Validator, exit_year: Option<u32>) {
        v.non_negative("equity_details.monthly_salary", self.monthly_salary());
        self.vesting().check(v);
        match self {
            Self::Rsu(rsu) => rsu.check(v, exit_year),
            Self::StockOptions(options) => options.check(v, exit_year),
        }
    }
}

/// RSU grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsuDetails {
    /// Startup monthly salary
    pub monthly_salary: f64,
    /// Vesting schedule
    pub vesting: VestingSchedule,
    /// Ownership granted, in percent of the company
    pub equity_pct: f64,
    /// Company valuation expected at exit
    pub target_exit_valuation: f64,
    /// Apply the dilution rounds below
    #[serde(default)]
    pub simulate_dilution: bool,
    /// Funding rounds expected before exit
    #[serde(default)]
    pub dilution_rounds: Vec<DilutionRound>,
}

impl RsuDetails {
    fn check(&self, v: &mut Validator, exit_year: Option<u32>) {
        v.in_range("equity_details.equity_pct", self.equity_pct, 0.0, 100.0);
        v.non_negative(
            "equity_details.target_exit_valuation",
            self.target_exit_valuation,
        );
        if self.simulate_dilution {
            for (idx, round) in self.dilution_rounds.iter().enumerate() {
                round.check(v, idx, exit_year);
            }
        }
    }
}

/// When options are exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStrategy {
    /// Exercise at the liquidity event
    #[default]
    AtExit,
    /// Exercise once vested, in a given year
    AfterVesting,
}

/// Stock option grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockOptionDetails {
    /// Startup monthly salary
    pub monthly_salary: f64,
    /// Vesting schedule
    pub vesting: VestingSchedule,
    /// Number of options granted
    pub num_options: u64,
    /// Price paid per share on exercise
    pub strike_price: f64,
    /// Expected share price at exit
    pub target_exit_price_per_share: f64,
    /// Exercise timing
    #[serde(default)]
    pub exercise_strategy: ExerciseStrategy,
    /// Year of exercise for [`ExerciseStrategy::AfterVesting`]
    #[serde(default)]
    pub exercise_year: Option<u32>,
}

impl StockOptionDetails {
    fn check(&self, v: &mut Validator, exit_year: Option<u32>) {
        v.check(
            self.num_options > 0,
            "equity_details.num_options",
            IssueReason::NotPositive,
        );
        v.non_negative("equity_details.strike_price", self.strike_price);
        v.non_negative(
            "equity_details.target_exit_price_per_share",
            self.target_exit_price_per_share,
        );
        if self.exercise_strategy == ExerciseStrategy::AfterVesting {
            match (self.exercise_year, exit_year) {
                (None, _) => v.push("equity_details.exercise_year", IssueReason::Missing),
                (Some(year), Some(exit)) if year == 0 || year > exit => v.push(
                    "equity_details.exercise_year",
                    IssueReason::Inconsistent("must fall between year 1 and the exit year".into()),
                ),
                _ => {}
            }
        }
    }
}

/// Funding round kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    /// SAFE note converting at a later priced round
    SafeNote,
    /// Priced equity round
    PricedRound,
}

/// One funding round that dilutes the grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionRound {
    /// Display name ("Series A")
    pub round_name: String,
    /// Round kind
    pub round_type: RoundType,
    /// Year the round closes
    pub year: u32,
    /// Explicit dilution fraction, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dilution: Option<f64>,
    /// Pre-money valuation of a priced round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_money_valuation: Option<f64>,
    /// Capital raised in the round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_raised: Option<f64>,
    /// SAFE valuation cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_cap: Option<f64>,
    /// SAFE conversion discount, as a fraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_discount: Option<f64>,
}

impl DilutionRound {
    fn check(&self, v: &mut Validator, idx: usize, exit_year: Option<u32>) {
        let field = |name: &str| format!("equity_details.dilution_rounds[{idx}].{name}");

        v.check(
            !self.round_name.trim().is_empty(),
            field("round_name"),
            IssueReason::Empty,
        );
        if let Some(exit) = exit_year {
            v.check(
                self.year >= 1 && self.year <= exit,
                field("year"),
                IssueReason::Inconsistent("must fall between year 1 and the exit year".into()),
            );
        }
        if let Some(dilution) = self.dilution {
            v.in_range(&field("dilution"), dilution, 0.0, 1.0);
        }
        if let Some(discount) = self.conversion_discount {
            v.in_range(&field("conversion_discount"), discount, 0.0, 1.0);
        }
        if self.round_type == RoundType::PricedRound {
            let priced = self.pre_money_valuation.is_some() && self.amount_raised.is_some();
            v.check(
                self.dilution.is_some() || priced,
                field("dilution"),
                IssueReason::Inconsistent(
                    "priced rounds need a dilution or a pre-money valuation and amount raised"
                        .into(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rsu() -> RsuDetails {
        RsuDetails {
            monthly_salary: 10_000.0,
            vesting: VestingSchedule {
                total_vesting_years: 4,
                cliff_years: 1,
            },
            equity_pct: 0.5,
            target_exit_valuation: 500_000_000.0,
            simulate_dilution: false,
            dilution_rounds: Vec::new(),
        }
    }

    fn complete() -> CalculationInput {
        CalculationInput::new()
            .with_global_settings(GlobalSettings { exit_year: 5 })
            .with_current_job(CurrentJob {
                monthly_salary: 8_000.0,
                annual_salary_growth_rate: 0.03,
                assumed_annual_roi: 0.054,
                investment_frequency: InvestmentFrequency::Monthly,
            })
            .with_equity_details(EquityDetails::Rsu(rsu()))
    }

    #[test]
    fn empty_input_reports_every_section() {
        let err = CalculationInput::new().validate().unwrap_err();
        assert_eq!(
            err.missing_fields().collect::<Vec<_>>(),
            vec!["global_settings", "current_job", "equity_details"]
        );
    }

    #[test]
    fn complete_input_validates() {
        let input = complete();
        let validated = input.validate().unwrap();
        assert_eq!(validated.global.exit_year, 5);
        assert_eq!(validated.equity.equity_type(), EquityType::Rsu);
        assert!((validated.equity.monthly_salary() - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cliff_longer_than_vesting_is_rejected() {
        let mut details = rsu();
        details.vesting.cliff_years = 5;
        let input = complete().with_equity_details(EquityDetails::Rsu(details));
        let err = input.validate().unwrap_err();
        assert!(err.has_issue("equity_details.vesting.cliff_years"));
    }

    #[test]
    fn dilution_rounds_only_checked_when_simulated() {
        let mut details = rsu();
        details.dilution_rounds.push(DilutionRound {
            round_name: String::new(),
            round_type: RoundType::PricedRound,
            year: 9,
            dilution: None,
            pre_money_valuation: None,
            amount_raised: None,
            valuation_cap: None,
            conversion_discount: None,
        });
        let ignored = complete().with_equity_details(EquityDetails::Rsu(details.clone()));
        assert!(ignored.is_valid());

        details.simulate_dilution = true;
        let checked = complete().with_equity_details(EquityDetails::Rsu(details));
        let err = checked.validate().unwrap_err();
        assert!(err.has_issue("equity_details.dilution_rounds[0].round_name"));
        assert!(err.has_issue("equity_details.dilution_rounds[0].year"));
        assert!(err.has_issue("equity_details.dilution_rounds[0].dilution"));
    }

    #[test]
    fn after_vesting_exercise_needs_a_year() {
        let options = StockOptionDetails {
            monthly_salary: 9_000.0,
            vesting: VestingSchedule {
                total_vesting_years: 4,
                cliff_years: 1,
            },
            num_options: 20_000,
            strike_price: 1.5,
            target_exit_price_per_share: 25.0,
            exercise_strategy: ExerciseStrategy::AfterVesting,
            exercise_year: None,
        };
        let input = complete().with_equity_details(EquityDetails::StockOptions(options));
        let err = input.validate().unwrap_err();
        assert_eq!(
            err.missing_fields().collect::<Vec<_>>(),
            vec!["equity_details.exercise_year"]
        );
    }

    #[test]
    fn equity_details_tagged_by_type() {
        let json = serde_json::to_value(EquityDetails::Rsu(rsu())).unwrap();
        assert_eq!(json["equity_type"], "rsu");
        assert_eq!(json["vesting"]["cliff_years"], 1);

        let parsed: EquityDetails = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, EquityDetails::Rsu(rsu()));
    }

    #[test]
    fn snapshot_loads_from_toml() {
        let doc = r#"
            [global_settings]
            exit_year = 5

            [current_job]
            monthly_salary = 8000.0
            annual_salary_growth_rate = 0.03
            assumed_annual_roi = 0.054
            investment_frequency = "annually"

            [equity_details]
            equity_type = "stock_options"
            monthly_salary = 9000.0
            num_options = 10000
            strike_price = 1.0
            target_exit_price_per_share = 20.0

            [equity_details.vesting]
            total_vesting_years = 4
            cliff_years = 1
        "#;
        let input: CalculationInput = toml::from_str(doc).unwrap();
        let validated = input.validate().unwrap();
        assert_eq!(validated.equity.equity_type(), EquityType::StockOptions);
        assert_eq!(
            validated.job.investment_frequency,
            InvestmentFrequency::Annually
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_vesting_bounds(exit_year in 0u32..40, total in 0u32..30, cliff in 0u32..30) {
            let mut details = rsu();
            details.vesting = VestingSchedule {
                total_vesting_years: total,
                cliff_years: cliff,
            };
            let input = complete()
                .with_global_settings(GlobalSettings { exit_year })
                .with_equity_details(EquityDetails::Rsu(details));

            let expected = (1..=MAX_EXIT_YEAR).contains(&exit_year)
                && (1..=MAX_EXIT_YEAR).contains(&total)
                && cliff <= total;
            proptest::prop_assert_eq!(input.is_valid(), expected);
        }
    }
}
