use outlay_common::email::templates::{
    EmailChangeOtpMessage, PasswordResetMessage, StaffEmailChangeMessage, VerificationMessage,
};
use outlay_common::email::{EmailMessage, SendEmail};

use crate::env;
use crate::jobs::JobError;

pub async fn send_verification_email(
    email_sender: &dyn SendEmail,
    user_email: &str,
    verification_url: &str,
) -> Result<(), JobError> {
    let message = EmailMessage {
        body: VerificationMessage::generate(
            verification_url,
            env::CONF.verification_token_lifetime,
        ),
        subject: "Verify your email",
        from: env::CONF.email_from_address.clone(),
        reply_to: env::CONF.email_reply_to_address.clone(),
        destination: user_email,
        is_html: true,
    };

    email_sender.send(message).await?;

    log::info!("Verification email sent to {user_email}");

    Ok(())
}

pub async fn send_password_reset_email(
    email_sender: &dyn SendEmail,
    user_email: &str,
    reset_url: &str,
) -> Result<(), JobError> {
    let message = EmailMessage {
        body: PasswordResetMessage::generate(
            reset_url,
            env::CONF.password_reset_token_lifetime,
        ),
        subject: "Reset your password",
        from: env::CONF.email_from_address.clone(),
        reply_to: env::CONF.email_reply_to_address.clone(),
        destination: user_email,
        is_html: true,
    };

    email_sender.send(message).await?;

    log::info!("Password reset email sent to {user_email}");

    Ok(())
}

/// Two separate messages, one per address; each carries only its own OTP.
pub async fn send_email_change_otps(
    email_sender: &dyn SendEmail,
    current_email: &str,
    new_email: &str,
    current_email_otp: &str,
    new_email_otp: &str,
) -> Result<(), JobError> {
    let current_message = EmailMessage {
        body: EmailChangeOtpMessage::generate(
            current_email_otp,
            false,
            env::CONF.email_change_otp_lifetime,
        ),
        subject: "Verify your email change request",
        from: env::CONF.email_from_address.clone(),
        reply_to: env::CONF.email_reply_to_address.clone(),
        destination: current_email,
        is_html: true,
    };

    email_sender.send(current_message).await?;

    let new_message = EmailMessage {
        body: EmailChangeOtpMessage::generate(
            new_email_otp,
            true,
            env::CONF.email_change_otp_lifetime,
        ),
        subject: "Verify your new email address",
        from: env::CONF.email_from_address.clone(),
        reply_to: env::CONF.email_reply_to_address.clone(),
        destination: new_email,
        is_html: true,
    };

    email_sender.send(new_message).await?;

    log::info!("Email change OTPs sent to {current_email} and {new_email}");

    Ok(())
}

pub async fn send_staff_email_change_email(
    email_sender: &dyn SendEmail,
    new_email: &str,
    verification_url: &str,
    username: &str,
) -> Result<(), JobError> {
    let message = EmailMessage {
        body: StaffEmailChangeMessage::generate(
            username,
            verification_url,
            env::CONF.staff_email_change_token_lifetime,
        ),
        subject: "Confirm your new email address",
        from: env::CONF.email_from_address.clone(),
        reply_to: env::CONF.email_reply_to_address.clone(),
        destination: new_email,
        is_html: true,
    };

    email_sender.send(message).await?;

    log::info!("Staff email change verification sent to {new_email}");

    Ok(())
}
