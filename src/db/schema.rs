//! Diesel descriptions of the registry tables. These must agree with the
//! `CREATE TABLE` statements in `schema_sql.rs`.

diesel::table! {
    observation (obs_id) {
        obs_id -> BigInt,
        projectid -> Nullable<Text>,
        lst_deg -> Nullable<Double>,
        starttime -> Nullable<BigInt>,
        duration_sec -> Nullable<Integer>,
        obsname -> Nullable<Text>,
        creator -> Nullable<Text>,
        azimuth_pointing -> Nullable<Double>,
        elevation_pointing -> Nullable<Double>,
        ra_pointing -> Nullable<Double>,
        dec_pointing -> Nullable<Double>,
        cenchan -> Nullable<Integer>,
        freq_res -> Nullable<Double>,
        int_time -> Nullable<Double>,
        delays -> Nullable<Text>,
        calibration -> Nullable<Bool>,
        cal_obs_id -> Nullable<BigInt>,
        calibrators -> Nullable<Text>,
        peelsrcs -> Nullable<Text>,
        flags -> Nullable<Text>,
        selfcal -> Nullable<Bool>,
        ion_phs_med -> Nullable<Integer>,
        ion_phs_peak -> Nullable<Integer>,
        ion_phs_std -> Nullable<Integer>,
        archived -> Nullable<Bool>,
        nfiles -> Nullable<Integer>,
        status -> Nullable<Text>,
    }
}

diesel::table! {
    processing (job_id, task_id, host_cluster) {
        job_id -> BigInt,
        task_id -> BigInt,
        host_cluster -> Text,
        submission_time -> Nullable<BigInt>,
        task -> Nullable<Text>,
        user -> Nullable<Text>,
        start_time -> Nullable<BigInt>,
        end_time -> Nullable<BigInt>,
        obs_id -> Nullable<BigInt>,
        status -> Nullable<Text>,
        batch_file -> Nullable<Text>,
        stderr -> Nullable<Text>,
        stdout -> Nullable<Text>,
        output_files -> Nullable<Text>,
    }
}

diesel::table! {
    sources (source) {
        source -> Text,
        #[sql_name = "RAJ2000"]
        ra_j2000 -> Double,
        #[sql_name = "DecJ2000"]
        dec_j2000 -> Double,
        flux -> Double,
        alpha -> Double,
        beta -> Double,
    }
}

diesel::table! {
    calapparent (obs_id, source) {
        obs_id -> BigInt,
        source -> Text,
        appflux -> Double,
        infov -> Bool,
    }
}

diesel::table! {
    mosaic (mos_id) {
        mos_id -> Integer,
        obs_id -> Nullable<BigInt>,
        job_id -> Nullable<BigInt>,
        task_id -> Nullable<BigInt>,
        host_cluster -> Nullable<Text>,
        user -> Nullable<Text>,
        subband -> Nullable<Text>,
        status -> Nullable<Text>,
        submission_time -> Nullable<BigInt>,
        start_time -> Nullable<BigInt>,
        end_time -> Nullable<BigInt>,
    }
}
