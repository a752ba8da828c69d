//! Candidate training and selection

use crate::artifact::ModelArtifact;
use crate::dataset::Dataset;
use crate::error::TrainError;
use crate::metrics::{mae, r2, rmse};
use crate::models::{
    BoostingParams, ForestParams, GradientBoosting, ModelKind, RandomForest, Regressor, Ridge,
    TrainedModel, XgBoost, XgBoostParams,
};
use crate::validation::{contiguous_folds, train_test_split};
use chrono::Utc;
use feature_engine::{FeatureConfig, FeatureRow, Target, DEFAULT_MODEL_FEATURES};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// RMSE differences at or below this are ties
const RMSE_TIE: f64 = 1e-12;

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Ordered predictor columns
    pub features: Vec<String>,
    /// Model families to fit
    pub candidates: Vec<ModelKind>,
    /// Trailing share of rows held out for validation
    pub test_ratio: f64,
    /// Contiguous folds for cross-validated R²; below 2 disables it
    pub cv_folds: usize,
    /// Minimum usable rows
    pub min_rows: usize,
    /// Ranked artifacts kept per run
    pub keep_top: usize,
    pub ridge_alpha: f64,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
    pub xgboost: XgBoostParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            features: DEFAULT_MODEL_FEATURES.iter().map(|s| s.to_string()).collect(),
            candidates: vec![
                ModelKind::Ridge,
                ModelKind::RandomForest,
                ModelKind::GradientBoosting,
                ModelKind::XgBoost,
            ],
            test_ratio: 0.2,
            cv_folds: 5,
            min_rows: 48,
            keep_top: 2,
            ridge_alpha: 1.0,
            random_forest: ForestParams::default(),
            gradient_boosting: BoostingParams::default(),
            xgboost: XgBoostParams::default(),
        }
    }
}

/// Validation scores of one fitted candidate
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub kind: ModelKind,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub cv_r2: Option<f64>,
}

struct Scored {
    score: CandidateScore,
    model: TrainedModel,
}

/// Fits every enabled candidate and ranks them on the validation split
pub struct Trainer {
    config: TrainingConfig,
    target: Target,
    horizon_hours: u32,
}

impl Trainer {
    /// Create a trainer; every configured feature must be produced by `features`
    pub fn new(config: TrainingConfig, features: &FeatureConfig) -> Result<Self, TrainError> {
        if config.features.is_empty() {
            return Err(TrainError::InvalidConfig("no features selected".to_string()));
        }
        if config.candidates.is_empty() {
            return Err(TrainError::InvalidConfig("no candidate models enabled".to_string()));
        }
        if config.keep_top == 0 {
            return Err(TrainError::InvalidConfig("keep_top must be at least 1".to_string()));
        }
        features.check_features(&config.features)?;

        Ok(Self {
            config,
            target: features.target,
            horizon_hours: features.horizon_hours,
        })
    }

    /// Train on `rows` and return the top candidates ranked from 1.
    ///
    /// Artifacts carry version 0 until storage assigns one.
    pub fn train(&self, rows: &[FeatureRow]) -> Result<Vec<ModelArtifact>, TrainError> {
        let dataset = Dataset::from_rows(rows, &self.config.features)?;
        let required = self.config.min_rows.max(4);
        if dataset.len() < required {
            return Err(TrainError::InsufficientData {
                required,
                actual: dataset.len(),
            });
        }

        let (train_range, test_range) = train_test_split(dataset.len(), self.config.test_ratio)?;
        let train = dataset.slice(train_range);
        let test = dataset.slice(test_range);
        info!(
            "Training {} candidates on {} rows, validating on {}",
            self.config.candidates.len(),
            train.len(),
            test.len()
        );

        let mut scored = Vec::new();
        for &kind in &self.config.candidates {
            match self.evaluate(kind, &train, &test) {
                Ok(s) if s.score.rmse.is_finite() => scored.push(s),
                Ok(s) => warn!("Discarding {}: validation RMSE is {}", kind, s.score.rmse),
                Err(e) => warn!("Discarding {}: {}", kind, e),
            }
        }

        rank(&mut scored);
        if scored.is_empty() {
            return Err(TrainError::NoValidModel);
        }
        log_ranking(&scored);

        let run_id = Uuid::new_v4();
        let trained_at = Utc::now();
        scored
            .into_iter()
            .take(self.config.keep_top)
            .enumerate()
            .map(|(i, s)| {
                Ok(ModelArtifact {
                    run_id,
                    version: 0,
                    rank: i as u32 + 1,
                    kind: s.score.kind,
                    target: self.target,
                    horizon_hours: self.horizon_hours,
                    features: self.config.features.clone(),
                    params: s.model.to_bytes()?,
                    rmse: s.score.rmse,
                    mae: s.score.mae,
                    r2: s.score.r2,
                    cv_r2: s.score.cv_r2,
                    trained_at,
                })
            })
            .collect()
    }

    fn candidate(&self, kind: ModelKind) -> TrainedModel {
        match kind {
            ModelKind::Ridge => TrainedModel::Ridge(Ridge::new(self.config.ridge_alpha)),
            ModelKind::RandomForest => {
                TrainedModel::RandomForest(RandomForest::new(self.config.random_forest.clone()))
            }
            ModelKind::GradientBoosting => TrainedModel::GradientBoosting(GradientBoosting::new(
                self.config.gradient_boosting.clone(),
            )),
            ModelKind::XgBoost => TrainedModel::XgBoost(XgBoost::new(self.config.xgboost.clone())),
        }
    }

    fn evaluate(&self, kind: ModelKind, train: &Dataset, test: &Dataset) -> Result<Scored, TrainError> {
        let mut model = self.candidate(kind);
        model.fit(train.x.view(), train.y.view())?;

        let predicted = model.predict(test.x.view()).to_vec();
        let actual = test.y.to_vec();

        Ok(Scored {
            score: CandidateScore {
                kind,
                rmse: rmse(&actual, &predicted),
                mae: mae(&actual, &predicted),
                r2: r2(&actual, &predicted),
                cv_r2: self.cross_validate(kind, train),
            },
            model,
        })
    }

    /// Mean R² over contiguous folds of `train`; `None` when no fold scored
    fn cross_validate(&self, kind: ModelKind, train: &Dataset) -> Option<f64> {
        let scores: Vec<f64> = contiguous_folds(train.len(), self.config.cv_folds)
            .into_iter()
            .filter_map(|fold| {
                let held_out = train.slice(fold.clone());
                let rest = train.without(fold);
                let mut model = self.candidate(kind);
                model.fit(rest.x.view(), rest.y.view()).ok()?;
                let predicted = model.predict(held_out.x.view()).to_vec();
                Some(r2(&held_out.y.to_vec(), &predicted)).filter(|s| s.is_finite())
            })
            .collect();

        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

fn precedes(a: &CandidateScore, b: &CandidateScore) -> bool {
    if (a.rmse - b.rmse).abs() <= RMSE_TIE {
        a.kind.complexity() < b.kind.complexity()
    } else {
        a.rmse < b.rmse
    }
}

/// Order by RMSE ascending with ties going to the simpler model.
///
/// Insertion sort: the tie tolerance is not transitive, so a comparator
/// handed to `sort_by` would not be a total order.
fn rank(scored: &mut [Scored]) {
    for i in 1..scored.len() {
        let mut j = i;
        while j > 0 && precedes(&scored[j].score, &scored[j - 1].score) {
            scored.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn log_ranking(scored: &[Scored]) {
    info!(
        "{:<4} {:<18} {:>10} {:>10} {:>8} {:>8}",
        "Rank", "Model", "RMSE", "MAE", "R2", "CV_R2"
    );
    for (i, s) in scored.iter().enumerate() {
        let cv = s
            .score
            .cv_r2
            .map(|v| format!("{:.4}", v))
            .unwrap_or_else(|| "-".to_string());
        info!(
            "{:<4} {:<18} {:>10.4} {:>10.4} {:>8.4} {:>8}",
            i + 1,
            s.score.kind.as_str(),
            s.score.rmse,
            s.score.mae,
            s.score.r2,
            cv
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::synthetic_rows;
    use proptest::prelude::*;

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            cv_folds: 3,
            min_rows: 24,
            random_forest: ForestParams {
                n_estimators: 8,
                max_depth: 5,
                ..Default::default()
            },
            gradient_boosting: BoostingParams {
                n_estimators: 20,
                ..Default::default()
            },
            xgboost: XgBoostParams {
                n_estimators: 20,
                max_depth: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn trainer(config: TrainingConfig) -> Trainer {
        Trainer::new(config, &FeatureConfig::default()).unwrap()
    }

    fn score(kind: ModelKind, rmse: f64) -> Scored {
        Scored {
            score: CandidateScore {
                kind,
                rmse,
                mae: 0.0,
                r2: 0.0,
                cv_r2: None,
            },
            model: TrainedModel::Ridge(Ridge::new(1.0)),
        }
    }

    #[test]
    fn test_linear_signal_selects_ridge() {
        let rows = synthetic_rows(120, |t, h| 2.0 * t + 0.5 * h + 3.0);
        let artifacts = trainer(fast_config()).train(&rows).unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].rank, 1);
        assert_eq!(artifacts[1].rank, 2);
        assert_eq!(artifacts[0].kind, ModelKind::Ridge);
        assert!(artifacts[0].rmse <= artifacts[1].rmse);
        assert_eq!(artifacts[0].run_id, artifacts[1].run_id);
        assert!(artifacts.iter().all(|a| a.rmse.is_finite()));
        assert!(artifacts[0].cv_r2.is_some());
    }

    #[test]
    fn test_artifact_decodes() {
        let rows = synthetic_rows(60, |t, _| t * 1.5);
        let artifacts = trainer(TrainingConfig {
            candidates: vec![ModelKind::GradientBoosting],
            ..fast_config()
        })
        .train(&rows)
        .unwrap();

        assert_eq!(artifacts.len(), 1);
        let model = artifacts[0].model().unwrap();
        assert_eq!(model.kind(), ModelKind::GradientBoosting);
        assert!(model.is_fitted());
    }

    #[test]
    fn test_insufficient_data() {
        let rows = synthetic_rows(10, |t, _| t);
        let result = trainer(fast_config()).train(&rows);
        assert!(matches!(
            result,
            Err(TrainError::InsufficientData {
                required: 24,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_tie_prefers_simpler_model() {
        let rows = synthetic_rows(60, |_, _| 42.0);
        let artifacts = trainer(fast_config()).train(&rows).unwrap();
        assert_eq!(artifacts[0].kind, ModelKind::Ridge);
        assert_eq!(artifacts[1].kind, ModelKind::GradientBoosting);
    }

    #[test]
    fn test_rank_orders_by_rmse_then_complexity() {
        let mut scored = vec![
            score(ModelKind::XgBoost, 1.0),
            score(ModelKind::RandomForest, 0.5),
            score(ModelKind::GradientBoosting, 1.0),
            score(ModelKind::Ridge, 2.0),
        ];
        rank(&mut scored);
        let kinds: Vec<_> = scored.iter().map(|s| s.score.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ModelKind::RandomForest,
                ModelKind::GradientBoosting,
                ModelKind::XgBoost,
                ModelKind::Ridge
            ]
        );
    }

    #[test]
    fn test_rejects_unknown_feature() {
        let config = TrainingConfig {
            features: vec!["pm2_5_lag_6h".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Trainer::new(config, &FeatureConfig::default()),
            Err(TrainError::Feature(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_artifacts_have_defined_metrics(
            slope in -5.0f64..5.0,
            offset in -50.0f64..50.0,
            corrupt in prop::collection::vec((0usize..80, 0u8..4), 0..40),
        ) {
            let mut rows = synthetic_rows(80, |t, h| slope * t + 0.1 * h + offset);
            for (i, how) in corrupt {
                match how {
                    0 => rows[i].label = Some(f64::NAN),
                    1 => rows[i].label = Some(f64::INFINITY),
                    2 => rows[i].weather.temperature = f64::NAN,
                    _ => rows[i].weather.humidity = f64::NEG_INFINITY,
                }
            }

            let config = TrainingConfig {
                candidates: vec![ModelKind::Ridge, ModelKind::GradientBoosting],
                ..fast_config()
            };
            match trainer(config).train(&rows) {
                Ok(artifacts) => {
                    prop_assert!(!artifacts.is_empty());
                    for a in &artifacts {
                        prop_assert!(a.rmse.is_finite());
                        prop_assert!(a.mae.is_finite());
                    }
                }
                Err(e) => prop_assert!(
                    matches!(e, TrainError::InsufficientData { .. } | TrainError::NoValidModel),
                    "unexpected error: {}",
                    e
                ),
            }
        }
    }
}
