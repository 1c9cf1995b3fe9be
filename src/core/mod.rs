pub mod iat;

pub use iat::{
    AudioEncoding, BusinessArgs, IatClient, IatConfig, IatCredentials, IatEndpoint,
    RecognitionOutcome, ServerError, SpeechRecognizer,
};
