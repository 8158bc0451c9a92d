/// Return this error from a virtual user's behaviour to indicate that the user is bailing.
///
/// This should be used when a virtual user encounters an error that is fatal to that user but not
/// necessarily to the run. For example, if the target keeps refusing connections for one user then
/// that user may bail while the rest of the population carries on.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VuBailError {
    msg: String,
}

impl Default for VuBailError {
    fn default() -> Self {
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}
