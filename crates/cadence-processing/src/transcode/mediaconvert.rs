//! AWS Elemental MediaConvert encoder backend.

use std::time::Instant;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_mediaconvert::types::{
    AacCodingMode, AacRateControlMode, AacSettings, AudioCodec, AudioCodecSettings,
    AudioDefaultSelection, AudioDescription, AudioSelector, ContainerSettings, ContainerType,
    HlsGroupSettings, HlsManifestDurationFormat, HlsOutputSelection, HlsSegmentControl, Input,
    JobSettings, M3u8PcrControl, M3u8Settings, Output, OutputGroup, OutputGroupSettings,
    OutputGroupType,
};
use aws_sdk_mediaconvert::Client as MediaConvertClient;
use cadence_core::EncoderConfig;

use super::{EncodeJob, EncodeRequest, Encoder, EncoderError};

const AUDIO_SELECTOR: &str = "Audio Selector 1";
const HLS_GROUP: &str = "HLS Group";
const SEGMENT_LENGTH_SECS: i32 = 6;
const SAMPLE_RATE: i32 = 48_000;
const AUDIO_FRAMES_PER_PES: i32 = 4;
const MANIFEST_NAME: &str = "master.m3u8";

pub struct MediaConvertEncoder {
    client: MediaConvertClient,
    role_arn: String,
    queue: Option<String>,
    output_bucket: String,
    renditions: Vec<i32>,
}

impl MediaConvertEncoder {
    /// Build a client against the account-specific MediaConvert endpoint.
    pub async fn from_config(config: &EncoderConfig) -> Result<Self, EncoderError> {
        if config.renditions.is_empty() {
            return Err(EncoderError::Config(
                "at least one rendition bitrate is required".to_string(),
            ));
        }
        let renditions = config
            .renditions
            .iter()
            .map(|b| {
                i32::try_from(*b)
                    .map_err(|_| EncoderError::Config(format!("bitrate {} is out of range", b)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let client_config = aws_sdk_mediaconvert::config::Builder::from(&sdk_config)
            .endpoint_url(config.endpoint.clone())
            .build();

        tracing::info!(
            endpoint = %config.endpoint,
            renditions = ?renditions,
            "MediaConvert encoder configured"
        );

        Ok(Self {
            client: MediaConvertClient::from_conf(client_config),
            role_arn: config.role_arn.clone(),
            queue: config.queue.clone(),
            output_bucket: config.output_bucket.clone(),
            renditions,
        })
    }

    fn job_settings(&self, request: &EncodeRequest) -> JobSettings {
        let input = Input::builder()
            .file_input(format!("s3://{}/{}", self.output_bucket, request.source_key))
            .audio_selectors(
                AUDIO_SELECTOR,
                AudioSelector::builder()
                    .default_selection(AudioDefaultSelection::Default)
                    .build(),
            )
            .build();

        let hls_settings = HlsGroupSettings::builder()
            .destination(format!(
                "s3://{}/{}",
                self.output_bucket, request.output_prefix
            ))
            .segment_length(SEGMENT_LENGTH_SECS)
            .min_segment_length(0)
            .output_selection(HlsOutputSelection::ManifestsAndSegments)
            .segment_control(HlsSegmentControl::SegmentedFiles)
            .manifest_duration_format(HlsManifestDurationFormat::FloatingPoint)
            .build();

        let mut group = OutputGroup::builder().name(HLS_GROUP).output_group_settings(
            OutputGroupSettings::builder()
                .r#type(OutputGroupType::HlsGroupSettings)
                .hls_group_settings(hls_settings)
                .build(),
        );
        for bitrate in &self.renditions {
            group = group.outputs(rendition(*bitrate));
        }

        JobSettings::builder()
            .inputs(input)
            .output_groups(group.build())
            .build()
    }
}

/// One AAC rendition muxed into HLS segments
fn rendition(bitrate: i32) -> Output {
    let container = ContainerSettings::builder()
        .container(ContainerType::M3U8)
        .m3u8_settings(
            M3u8Settings::builder()
                .audio_frames_per_pes(AUDIO_FRAMES_PER_PES)
                .pcr_control(M3u8PcrControl::PcrEveryPesPacket)
                .build(),
        )
        .build();

    let audio = AudioDescription::builder()
        .audio_source_name(AUDIO_SELECTOR)
        .codec_settings(
            AudioCodecSettings::builder()
                .codec(AudioCodec::Aac)
                .aac_settings(
                    AacSettings::builder()
                        .bitrate(bitrate)
                        .coding_mode(AacCodingMode::CodingMode20)
                        .sample_rate(SAMPLE_RATE)
                        .rate_control_mode(AacRateControlMode::Cbr)
                        .build(),
                )
                .build(),
        )
        .build();

    Output::builder()
        .name_modifier(name_modifier(bitrate))
        .container_settings(container)
        .audio_descriptions(audio)
        .build()
}

fn name_modifier(bitrate: i32) -> String {
    format!("{}k", bitrate / 1000)
}

#[async_trait]
impl Encoder for MediaConvertEncoder {
    #[tracing::instrument(skip(self), fields(track_id = %request.track_id, user_id = %request.user_id))]
    async fn submit(&self, request: &EncodeRequest) -> Result<EncodeJob, EncoderError> {
        let start = Instant::now();

        let mut create = self
            .client
            .create_job()
            .role(&self.role_arn)
            .settings(self.job_settings(request))
            .tags("trackId", &request.track_id)
            .tags("userId", &request.user_id);
        if let Some(queue) = &self.queue {
            create = create.queue(queue);
        }

        let output = create
            .send()
            .await
            .map_err(|e| EncoderError::Submission(e.to_string()))?;

        let job_id = output
            .job()
            .and_then(|job| job.id())
            .ok_or_else(|| EncoderError::Submission("response carried no job id".to_string()))?
            .to_string();

        let manifest_key = format!("{}{}", request.output_prefix, MANIFEST_NAME);

        tracing::info!(
            job_id = %job_id,
            manifest_key = %manifest_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "MediaConvert job submitted"
        );

        Ok(EncodeJob {
            job_id,
            manifest_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendition_names_follow_bitrate() {
        assert_eq!(name_modifier(96_000), "96k");
        assert_eq!(name_modifier(320_000), "320k");
    }

    #[test]
    fn rendition_uses_requested_bitrate() {
        let output = rendition(192_000);
        assert_eq!(output.name_modifier(), Some("192k"));
        let aac = output
            .audio_descriptions()
            .first()
            .and_then(|d| d.codec_settings())
            .and_then(|c| c.aac_settings())
            .unwrap();
        assert_eq!(aac.bitrate(), Some(192_000));
        assert_eq!(aac.sample_rate(), Some(SAMPLE_RATE));
    }
}
