use aplusa::config::{IMPORTANCE_FILE, PATIENTS_FILE, PREDICTIONS_FILE, SCORES_FILE};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const PATIENTS_CSV: &str = "\
PatientID,Age,Sex,Pathology,n_visits,visits_per_month,months_active,days_since_last_visit,adherence,satisfaction,response_mean,response_std,biomarker_mean,biomarker_std,biomarker_min,biomarker_max
P001,34,F,NSCLC,12,2.5,4.8,10,0.9,4.5,0.6,0.1,100.0,10.0,80.0,120.0
P002,58,M,Melanoma,8,1.0,8.0,45,0.5,3.0,0.4,0.2,95.0,12.0,70.0,118.0
P003,45,F,CRC,20,3.0,6.7,5,0.8,4.0,0.7,0.1,110.0,8.0,90.0,130.0
P004,71,M,NSCLC,4,0.5,8.0,120,0.3,2.0,0.2,0.3,85.0,15.0,60.0,115.0
P005,45,F,Breast Cancer,15,2.0,7.5,20,0.7,3.5,0.5,0.15,105.0,9.0,88.0,125.0
P006,62,M,CRC,10,1.5,6.7,30,0.6,3.8,0.45,0.12,98.0,11.0,75.0,121.0
";

// P006 has no prediction and P099 has no features.
pub const PREDICTIONS_CSV: &str = "\
PatientID,y_true,y_proba,pred_label,risk_category,pred_high_sensitivity,pred_high_precision,shap_top_feature
P001,1,0.91,1,High,1,1,visits_per_month
P002,0,0.12,0,Low,0,0,days_since_last_visit
P003,1,0.47,0,Medium,1,0,adherence
P004,0,0.72,1,High,1,1,days_since_last_visit
P005,0,0.30,0,Low,0,0,satisfaction
P099,1,0.55,1,Medium,1,0,n_visits
";

pub const IMPORTANCE_CSV: &str = "\
feature,importance
adherence,0.12
visits_per_month,0.31
days_since_last_visit,0.22
satisfaction,0.05
n_visits,0.12
";

pub const SCORES_CSV: &str = "\
model,auc,precision,recall,f1,pr_auc,brier
Random Forest,0.936,0.667,0.545,0.600,0.638,0.063
Logistic Regression,0.921,0.404,0.955,0.568,0.477,0.081
";

pub fn write_dataset(dir: &Path) {
    fs::write(dir.join(PATIENTS_FILE), PATIENTS_CSV).expect("write patients");
    fs::write(dir.join(PREDICTIONS_FILE), PREDICTIONS_CSV).expect("write predictions");
    fs::write(dir.join(IMPORTANCE_FILE), IMPORTANCE_CSV).expect("write importance");
    fs::write(dir.join(SCORES_FILE), SCORES_CSV).expect("write scores");
}

pub fn dataset_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temporary directory");
    write_dataset(dir.path());
    dir
}
