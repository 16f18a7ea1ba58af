use std::time::Duration;

pub struct VerificationMessage {}

impl VerificationMessage {
    pub fn generate(verification_url: &str, link_lifetime: Duration) -> String {
        format!(
            "<html>
               <head>
                 <style>
                   body {{
                     font-family: Arial, sans-serif;
                     text-align: center;
                   }}
                 </style>
               </head>
             <body>
               <h1>Verify Your Email</h1>
               <p>Click the link below to verify your account.
               <b>The link expires in {} minutes.</b></p>
               <p><a href=\"{}\">{}</a></p>
               <p>If you did not create an account, you can ignore this email.</p>
             </body>
             </html>",
            link_lifetime.as_secs() / 60,
            verification_url,
            verification_url,
        )
    }
}

pub struct PasswordResetMessage {}

impl PasswordResetMessage {
    pub fn generate(reset_url: &str, link_lifetime: Duration) -> String {
        format!(
            "<html>
               <head>
                 <style>
                   body {{
                     font-family: Arial, sans-serif;
                     text-align: center;
                   }}
                 </style>
               </head>
             <body>
               <h1>Reset Your Password</h1>
               <p>Click the link below to choose a new password.
               <b>The link expires in {} minutes.</b></p>
               <p><a href=\"{}\">{}</a></p>
               <p>If you did not request a password reset, you can ignore this
               email. Your password will not change.</p>
             </body>
             </html>",
            link_lifetime.as_secs() / 60,
            reset_url,
            reset_url,
        )
    }
}

pub struct EmailChangeOtpMessage {}

impl EmailChangeOtpMessage {
    /// One message shape for both halves of the dual-OTP flow; the wording
    /// differs only in which address the code belongs to.
    pub fn generate(otp: &str, is_for_new_email: bool, otp_lifetime: Duration) -> String {
        let heading = if is_for_new_email {
            "Verify Your New Email Address"
        } else {
            "Verify Your Email Change Request"
        };

        format!(
            "<html>
               <head>
                 <style>
                   body {{
                     font-family: Arial, sans-serif;
                     text-align: center;
                   }}
                 </style>
               </head>
             <body>
               <h1>{}</h1>
               <h2 style=\"font-family: 'Courier New', monospace; user-select: all;
               -webkit-user-select: all;\"><b>{}</b></h2>
               <p>We will never ask you for this code over the phone or email.
               <b>Your code expires in {} minutes.</b></p>
             </body>
             </html>",
            heading,
            otp,
            otp_lifetime.as_secs() / 60,
        )
    }
}

pub struct StaffEmailChangeMessage {}

impl StaffEmailChangeMessage {
    pub fn generate(username: &str, verification_url: &str, link_lifetime: Duration) -> String {
        format!(
            "<html>
               <head>
                 <style>
                   body {{
                     font-family: Arial, sans-serif;
                     text-align: center;
                   }}
                 </style>
               </head>
             <body>
               <h1>Confirm Your New Email Address</h1>
               <p>An email change was requested for the account
               <b>{}</b>. Click the link below to confirm this address.
               <b>The link expires in {} hours.</b></p>
               <p><a href=\"{}\">{}</a></p>
               <p>If you do not recognize this account, you can ignore this
               email.</p>
             </body>
             </html>",
            username,
            link_lifetime.as_secs() / 3600,
            verification_url,
            verification_url,
        )
    }
}
